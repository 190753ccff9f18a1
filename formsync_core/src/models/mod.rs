pub mod forms;
pub mod instances;
pub mod server;
