pub(crate) mod config;
pub(crate) mod keys;
pub(crate) mod nand;
pub(crate) mod sign;
pub(crate) mod verify;
