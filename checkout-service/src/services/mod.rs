pub mod intent;
pub mod mercadopago;
pub mod poller;
pub mod reconciler;
pub mod store;

pub use intent::PaymentIntentBuilder;
pub use mercadopago::{MercadoPagoClient, PaymentGateway, WebhookVerifier};
pub use poller::{PaymentPoller, PollHandle};
pub use reconciler::Reconciler;
pub use store::{MongoOrderStore, OrderStore};
