//! Declarative query configuration applied to a single aggregation run.
//!
//! Every read goes through [`GetOptions`]: a filter, a projection, a sort, a
//! limit and a list of relation expansions, all independently optional and
//! all composing into one pipeline. Relation expansion (`populate`) replaces
//! a stored reference with the referenced document, recursively for nested
//! directives, e.g. order -> orderItems -> product -> category.

use futures::stream::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::Database;

/// One relation expansion: `field` holds ObjectId reference(s) into the
/// `from` collection. `many` distinguishes an array of references from a
/// single one (single refs are unwound back to a sub-document).
#[derive(Debug, Clone)]
pub struct Populate {
    field: String,
    from: String,
    many: bool,
    selection: Option<Document>,
    nested: Vec<Populate>,
}

impl Populate {
    pub fn one(field: &str, from: &str) -> Self {
        Populate {
            field: field.to_string(),
            from: from.to_string(),
            many: false,
            selection: None,
            nested: Vec::new(),
        }
    }

    pub fn many(field: &str, from: &str) -> Self {
        Populate {
            field: field.to_string(),
            from: from.to_string(),
            many: true,
            selection: None,
            nested: Vec::new(),
        }
    }

    /// Projection applied to the expanded documents.
    pub fn select(mut self, selection: Document) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Expands a reference inside the already-expanded documents.
    pub fn then(mut self, nested: Populate) -> Self {
        self.nested.push(nested);
        self
    }

    fn stages(&self) -> Vec<Document> {
        let mut sub = vec![if self.many {
            // A missing/empty reference array joins to nothing rather than
            // erroring inside $in.
            doc! { "$match": { "$expr": { "$in": ["$_id", { "$ifNull": ["$$refs", []] }] } } }
        } else {
            doc! { "$match": { "$expr": { "$eq": ["$_id", "$$ref"] } } }
        }];

        for nested in &self.nested {
            sub.extend(nested.stages());
        }

        if let Some(selection) = &self.selection {
            sub.push(doc! { "$project": selection.clone() });
        }

        let let_vars = if self.many {
            doc! { "refs": format!("${}", self.field) }
        } else {
            doc! { "ref": format!("${}", self.field) }
        };

        let mut stages = vec![doc! {
            "$lookup": {
                "from": self.from.as_str(),
                "let": let_vars,
                "pipeline": sub,
                "as": self.field.as_str(),
            }
        }];

        if !self.many {
            stages.push(doc! {
                "$unwind": {
                    "path": format!("${}", self.field),
                    "preserveNullAndEmptyArrays": true,
                }
            });
        }

        stages
    }
}

/// The options bag for a read. Absence of any option is a no-op, never an
/// error.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub filter: Option<Document>,
    pub selection: Option<Document>,
    pub sort: Option<Document>,
    pub limit: Option<i64>,
    pub populate: Vec<Populate>,
}

impl GetOptions {
    pub fn filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn selection(mut self, selection: Document) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn populate(mut self, populate: Populate) -> Self {
        self.populate.push(populate);
        self
    }
}

/// Stage order: match, lookups, sort, limit, project. Projecting last lets a
/// selection reference populated fields.
pub fn build_pipeline(options: &GetOptions) -> Vec<Document> {
    let mut pipeline = Vec::new();

    if let Some(filter) = &options.filter {
        pipeline.push(doc! { "$match": filter.clone() });
    }

    for populate in &options.populate {
        pipeline.extend(populate.stages());
    }

    if let Some(sort) = &options.sort {
        pipeline.push(doc! { "$sort": sort.clone() });
    }

    match options.limit {
        Some(limit) if limit > 0 => pipeline.push(doc! { "$limit": limit }),
        _ => {}
    }

    if let Some(selection) = &options.selection {
        pipeline.push(doc! { "$project": selection.clone() });
    }

    pipeline
}

/// Runs the configured query; always a sequence, possibly empty.
pub async fn find_many(
    db: &Database,
    collection: &str,
    options: &GetOptions,
) -> Result<Vec<Document>, mongodb::error::Error> {
    let cursor = db
        .collection::<Document>(collection)
        .aggregate(build_pipeline(options), None)
        .await?;

    cursor.try_collect().await
}

/// Like [`find_many`] but pinned to one id; the caller's filter still applies
/// (e.g. restricting an order lookup to its owner).
pub async fn find_by_id(
    db: &Database,
    collection: &str,
    id: ObjectId,
    options: &GetOptions,
) -> Result<Option<Document>, mongodb::error::Error> {
    let mut filter = options.filter.clone().unwrap_or_default();
    filter.insert("_id", id);

    let scoped = GetOptions {
        filter: Some(filter),
        limit: Some(1),
        ..options.clone()
    };

    Ok(find_many(db, collection, &scoped).await?.into_iter().next())
}
