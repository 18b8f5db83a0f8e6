mod cents;
pub mod helpers;
pub mod op;
mod payment_method;
mod secret;

pub use cents::{Cents, CentsConversionError, CURRENCY_CODE};
pub use payment_method::{PaymentMethod, PaymentMethodParseError};
pub use secret::Secret;
