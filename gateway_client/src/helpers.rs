use spg_common::Secret;

/// Builds the `Authorization` header value the processor expects: `Basic base64(public_key:secret_key)`.
pub fn basic_auth_header(public_key: &Secret<String>, secret_key: &Secret<String>) -> String {
    let credentials = format!("{}:{}", public_key.reveal(), secret_key.reveal());
    format!("Basic {}", base64::encode(credentials))
}
