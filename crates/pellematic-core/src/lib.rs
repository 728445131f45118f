//! Pellematic Core - Entity discovery and value decoding for Ökofen controllers
//!
//! This crate turns the controller's schema-less status JSON into typed
//! entity definitions:
//! - Charset detection and repair of known payload malformations
//! - Heuristic classification of fields into sensors, binary sensors, selects and numbers
//! - Unit, device class, state class and icon inference
//! - Poll-time decoding of raw values into display values
//!
//! Everything here is pure and synchronous; I/O lives in `pellematic-client`.

pub mod charset;
pub mod classify;
pub mod climate;
pub mod command;
pub mod component;
pub mod decode;
pub mod definition;
pub mod discovery;
pub mod field;
pub mod normalize;
pub mod semantics;

pub use charset::Charset;
pub use classify::{classify, EntityKind};
pub use climate::ClimateDefinition;
pub use command::{encode_command_value, CommandValueError};
pub use component::{ComponentKey, Language};
pub use decode::{decode, decode_binary, decode_option, DecodeContext, DisplayValue};
pub use definition::EntityDefinition;
pub use discovery::{count_instances, discover, DiscoveryResult};
pub use field::{FieldError, RawField};
pub use normalize::{normalize, parse_payload, PayloadError};
pub use semantics::{DeviceClass, StateClass};
