//! # xapisim Core
//!
//! An in-memory simulation of the XenAPI management interface.
//!
//! Every call enters through [`XenApi::dispatch`], which resolves
//! `Class.operation`, checks the parameter count, validates the session
//! token and returns an [`Envelope`]. Operations are either hand-written
//! class methods or accessors synthesized from a class's field table
//! (`get_X`, `set_X`, `add_to_X`, `remove_from_X`, `add_X`, `remove_X`).
//!
//! ```rust
//! use xapisim_core::{SimulatorSettings, Value, XenApi};
//!
//! let api = XenApi::new(&SimulatorSettings::default()).unwrap();
//! let session = api
//!     .dispatch(
//!         "session.login_with_password",
//!         &[Value::from("root"), Value::from("xenserver")],
//!     )
//!     .into_value()
//!     .unwrap();
//!
//! let hosts = api.dispatch("host.get_all", &[session]);
//! assert!(hosts.is_success());
//! ```

pub mod accessor;
pub mod api;
pub mod class;
pub mod envelope;
pub mod error;
pub mod method;
pub mod params;
pub mod schema;
pub mod session;
pub mod settings;
pub mod store;
pub mod value;

mod classes;

pub use api::XenApi;
pub use envelope::Envelope;
pub use error::{ApiError, ErrorKind, Result};
pub use session::spawn_expiry_sweep;
pub use settings::SimulatorSettings;
pub use value::{Record, Value, NULL_REF};
