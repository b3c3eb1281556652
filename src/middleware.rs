use std::rc::Rc;

use actix_service::{forward_ready, Service};
use actix_web::dev::{Payload, ServiceRequest, Transform};
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use futures::future::{ok, ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mongodb::bson::oid::ObjectId;

use crate::error::ApiError;
use crate::models::Claims;

/// Verified token identity attached to the request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: ObjectId,
    pub is_admin: bool,
}

/// Signing secret shared between the middleware and the login route.
#[derive(Clone)]
pub struct TokenSecret(pub String);

pub fn has_identity(req: &HttpRequest) -> bool {
    req.extensions().get::<Identity>().is_some()
}

pub fn is_admin(req: &HttpRequest) -> bool {
    req.extensions()
        .get::<Identity>()
        .map(|identity| identity.is_admin)
        .unwrap_or(false)
}

fn decode_bearer(header: &str, secret: &str) -> Option<Identity> {
    let token = header.strip_prefix("Bearer ")?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .ok()?;

    let user_id = ObjectId::parse_str(&data.claims.sub).ok()?;

    Some(Identity {
        user_id,
        is_admin: data.claims.is_admin,
    })
}

/// Optional-auth middleware: decodes a bearer token when one is present and
/// attaches the [`Identity`]; a missing or invalid token just proceeds
/// unauthenticated. Role checks happen in the extractors below.
pub struct AuthMiddleware {
    secret: String,
}

impl AuthMiddleware {
    pub fn new(secret: String) -> Self {
        AuthMiddleware { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = actix_web::dev::ServiceResponse<B>, Error = actix_web::Error>
        + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = actix_web::dev::ServiceResponse<B>, Error = actix_web::Error>
        + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let secret = self.secret.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let identity = req
                .headers()
                .get("Authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|header| decode_bearer(header, &secret));

            if let Some(identity) = identity {
                req.extensions_mut().insert(identity);
            }

            service.call(req).await
        })
    }
}

fn identity(req: &HttpRequest) -> Option<Identity> {
    req.extensions().get::<Identity>().cloned()
}

/// Guard for routes that need any authenticated caller.
pub struct CurrentUser(pub Identity);

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            identity(req)
                .map(CurrentUser)
                .ok_or_else(|| ApiError::Unauthorized("You are not logged in.".into())),
        )
    }
}

/// Guard for admin-only routes. A valid customer token is rejected with a
/// distinct error from a missing one.
#[derive(Debug)]
pub struct AdminUser(pub Identity);

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match identity(req) {
            None => Err(ApiError::Unauthorized("You are not logged in.".into())),
            Some(identity) if !identity.is_admin => {
                Err(ApiError::Forbidden("You are not authorized.".into()))
            }
            Some(identity) => Ok(AdminUser(identity)),
        };

        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token_for(user_id: &ObjectId, is_admin: bool, exp_offset_secs: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset_secs) as usize;
        let claims = Claims {
            sub: user_id.to_hex(),
            is_admin,
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_ref()),
        )
        .unwrap()
    }

    #[test]
    fn bearer_token_round_trips_into_an_identity() {
        let user_id = ObjectId::new();
        let header = format!("Bearer {}", token_for(&user_id, true, 3600));

        let identity = decode_bearer(&header, SECRET).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert!(identity.is_admin);
    }

    #[test]
    fn expired_and_malformed_tokens_are_rejected() {
        let user_id = ObjectId::new();

        let expired = format!("Bearer {}", token_for(&user_id, false, -3600));
        assert!(decode_bearer(&expired, SECRET).is_none());

        assert!(decode_bearer("Bearer not.a.token", SECRET).is_none());
        assert!(decode_bearer("Basic abc123", SECRET).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let header = format!("Bearer {}", token_for(&ObjectId::new(), true, 3600));
        assert!(decode_bearer(&header, "other-secret").is_none());
    }

    #[actix_web::test]
    async fn admin_guard_distinguishes_missing_from_customer_tokens() {
        let anonymous = TestRequest::default().to_http_request();
        let denied = AdminUser::from_request(&anonymous, &mut Payload::None)
            .await
            .unwrap_err();
        assert!(matches!(denied, ApiError::Unauthorized(_)));

        let customer = TestRequest::default().to_http_request();
        customer.extensions_mut().insert(Identity {
            user_id: ObjectId::new(),
            is_admin: false,
        });
        let rejected = AdminUser::from_request(&customer, &mut Payload::None)
            .await
            .unwrap_err();
        assert!(matches!(rejected, ApiError::Forbidden(_)));

        let admin = TestRequest::default().to_http_request();
        admin.extensions_mut().insert(Identity {
            user_id: ObjectId::new(),
            is_admin: true,
        });
        assert!(AdminUser::from_request(&admin, &mut Payload::None)
            .await
            .is_ok());
    }

    #[actix_web::test]
    async fn current_user_guard_requires_an_identity() {
        let anonymous = TestRequest::default().to_http_request();
        assert!(CurrentUser::from_request(&anonymous, &mut Payload::None)
            .await
            .is_err());
        assert!(!has_identity(&anonymous));
        assert!(!is_admin(&anonymous));

        let authed = TestRequest::default().to_http_request();
        authed.extensions_mut().insert(Identity {
            user_id: ObjectId::new(),
            is_admin: false,
        });
        assert!(CurrentUser::from_request(&authed, &mut Payload::None)
            .await
            .is_ok());
        assert!(has_identity(&authed));
        assert!(!is_admin(&authed));
    }
}
