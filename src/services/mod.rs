pub mod chapa;
pub mod notifications;
pub mod payments;
pub mod repository;

pub use chapa::ChapaClient;
pub use notifications::Notifier;
pub use payments::PaymentCoordinator;
pub use repository::Repository;
