pub(crate) mod account_handlers;
pub(crate) mod b2c_handlers;
pub(crate) mod mpesa_handlers;
