//! Request signature middleware.
//!
//! Two kinds of caller sign their requests with HMAC-SHA256 and a hex digest in a header:
//!
//! * The payment processor signs every webhook body under the shared webhook secret (`SPG_WEBHOOK_HMAC_SECRET`) and
//!   sends the digest in `X-Webhook-Signature`.
//! * Back-office tools sign `"{METHOD} {path}\n"` followed by the body under `SPG_ADMIN_HMAC_SECRET` and send it in
//!   `X-Admin-Signature`. Including the request line stops a signature for one order being replayed against another.
//!
//! The whole body is buffered, checked against the header in constant time, and then handed back to the request so
//! the route deserializes exactly the bytes that were signed. Unsigned or mis-signed requests get `401 Unauthorized`
//! and never reach a handler.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::{h1, header::HeaderMap};
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorUnauthorized},
    web::Bytes,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use spg_common::Secret;
use storefront_payment_engine::helpers::verify_hmac;

/// The bytes an admin request signature covers.
pub fn request_signing_payload(method: &str, path: &str, body: &[u8]) -> Vec<u8> {
    let mut payload = format!("{} {path}\n", method.to_ascii_uppercase()).into_bytes();
    payload.extend_from_slice(body);
    payload
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignedContent {
    Body,
    RequestLineAndBody,
}

/// The header to read, the key to check it with, what is signed, and whether checking is switched on at all.
struct SignatureCheck {
    header: String,
    key: Secret<String>,
    content: SignedContent,
    enabled: bool,
}

impl SignatureCheck {
    fn verify(&self, method: &str, path: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), &'static str> {
        let signature = headers.get(&self.header).and_then(|v| v.to_str().ok()).ok_or("No HMAC signature found.")?;
        let valid = match self.content {
            SignedContent::Body => verify_hmac(self.key.reveal(), body, signature),
            SignedContent::RequestLineAndBody => {
                verify_hmac(self.key.reveal(), &request_signing_payload(method, path, body), signature)
            },
        };
        if valid {
            Ok(())
        } else {
            Err("Invalid HMAC signature.")
        }
    }
}

pub struct HmacMiddlewareFactory {
    check: Rc<SignatureCheck>,
}

impl HmacMiddlewareFactory {
    /// Checks a signature over the body alone. When `enabled` is false every request is let through unchecked.
    pub fn new(hmac_header: &str, key: Secret<String>, enabled: bool) -> Self {
        Self::build(hmac_header, key, SignedContent::Body, enabled)
    }

    /// Checks a signature over the request line and the body. See [`request_signing_payload`]. Always enabled.
    pub fn for_admin_requests(hmac_header: &str, key: Secret<String>) -> Self {
        Self::build(hmac_header, key, SignedContent::RequestLineAndBody, true)
    }

    fn build(header: &str, key: Secret<String>, content: SignedContent, enabled: bool) -> Self {
        Self { check: Rc::new(SignatureCheck { header: header.to_string(), key, content, enabled }) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService { check: Rc::clone(&self.check), service: Rc::new(service) }))
    }
}

pub struct HmacMiddlewareService<S> {
    check: Rc<SignatureCheck>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let check = Rc::clone(&self.check);
        Box::pin(async move {
            if !check.enabled {
                trace!("🔐️ Signature checks are off. Passing {} through.", req.path());
                return service.call(req).await;
            }
            let body = req.extract::<Bytes>().await.map_err(|e| {
                warn!("🔐️ Could not buffer the body of a signed request: {e}");
                ErrorBadRequest("Failed to extract request data.")
            })?;
            if let Err(reason) = check.verify(req.method().as_str(), req.path(), req.headers(), &body) {
                warn!("🔐️ Rejecting signed request to {}: {reason}", req.path());
                return Err(ErrorUnauthorized(reason));
            }
            trace!("🔐️ Request signature ✅️");
            req.set_payload(replay(body));
            service.call(req).await
        })
    }
}

fn replay(body: Bytes) -> Payload {
    let (_, mut payload) = h1::Payload::create(true);
    payload.unread_data(body);
    Payload::from(payload)
}
