//! Price source implementations (Pyth Hermes)

mod hermes;

pub use hermes::{parse_quote, ApiFlavor, HermesClient, HERMES_URL};
