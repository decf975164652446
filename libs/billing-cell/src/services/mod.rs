pub mod calculation;
pub mod claims;
pub mod insurance;
pub mod invoice;

pub use insurance::InsuranceService;
pub use invoice::InvoiceService;
