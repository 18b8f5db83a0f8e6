use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

/// Generates an order number of the form `ORD-<unix millis>-<6 random alphanumerics>`.
pub fn new_order_number() -> String {
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(6).map(char::from).collect();
    format!("ORD-{}-{suffix}", Utc::now().timestamp_millis())
}
