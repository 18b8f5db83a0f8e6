mod hmac;

pub use hmac::{request_signing_payload, HmacMiddlewareFactory, HmacMiddlewareService};
