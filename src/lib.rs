//! # refbox_core
//!
//! The Benchmark Execution Core of a referee box used to run standardized
//! robot benchmarks. The core orchestrates a three-party protocol between a
//! robot under test reached over an encrypted datagram channel, an external
//! benchmark script reached over a request/response + publish/subscribe
//! transport, and a human referee operating through a display surface.
//!
//! - **Time Control**: a recurring countdown with explicit arming/pausing
//! - **Secure Channel**: the encrypted UDP beacon/command loop to one robot
//! - **Script Link**: the request/response services and latched state
//!   publish a script coordinates through
//! - **Executor**: the phase machine, scoring table, and the Simple,
//!   Externally Controlled, and All-Robots variants
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use refbox_core::event::{BenchmarkDescriptor, Event};
//! use refbox_core::executor::SimpleExecutor;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let event = Event {
//!     team: "alpha".into(),
//!     round: 1,
//!     run: 1,
//!     benchmark_code: "nav1".into(),
//!     benchmark: BenchmarkDescriptor {
//!         timeout: Duration::from_secs(300),
//!         total_timeout: Duration::from_secs(3000),
//!         prefix: String::new(),
//!         scoring: vec![],
//!     },
//!     password: "secret".into(),
//!     cipher_suite: "aes-128-cbc".into(),
//! };
//! let _executor = SimpleExecutor::new(
//!     event,
//!     "robot1",
//!     10000,
//!     3000,
//!     Duration::from_secs(120),
//!     Arc::new(AtomicBool::new(false)),
//!     None,
//! );
//! ```

pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod event;
pub mod executor;
pub mod log_paths;
pub mod script_link;
pub mod secure_channel;
pub mod shared_state;
pub mod timer;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use event::{BenchmarkDescriptor, Event, ScoringItem, ScoringKind, ScoringTemplate};
pub use executor::{
    AllRobotsExecutor, DeviceActuator, ExecutorBase, ExternallyControlledExecutor, Phase,
    RefBoxState, RefBoxStateTriple, SimpleExecutor,
};
pub use script_link::ScriptLink;
pub use secure_channel::{BenchmarkState, CipherSuite, RobotState, SecureChannel};
pub use shared_state::SharedState;
pub use timer::TimeControl;
