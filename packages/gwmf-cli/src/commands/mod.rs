pub mod inject;
pub mod psd;
pub mod search;
