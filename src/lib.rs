//! # Trealla Driver
//!
//! Drives the Trealla Prolog toplevel as a subprocess on a pseudo-terminal:
//! host values are encoded as goals, the engine's interactive output is
//! classified, and bindings come back as typed solutions.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Arg values
//!     ↓
//! [Term Encoder]          → goal text  name(a1,...,an)
//!     ↓
//! [Session]               → sends "goal.\n" over the Transport
//!     ↓
//! [Pattern Classifier]    → Prompt / WantMore / True / False / Error / Result / ...
//!     ↓
//! [Session worker]        → answers ";" cues, releases the caller
//!     ↓
//! [Response Decoder]      → Solution { "X": Value, ... }
//!     ↓
//! Solutions iterator (one solution per pull)
//! ```
//!
//! ### Process Integration
//! ```text
//! SessionCache
//!     └── path → Session
//!                  ├── Expect buffer
//!                  └── Transport (pty | scripted)
//!                        └── tpl process
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trealla_driver::{args, Arg, Session};
//!
//! let session = Session::spawn("tpl")?;
//! session.load("family.pl")?;
//!
//! let answer = session.query("parent", &args![Arg::atom("tom"), Arg::var("Child")])?;
//! if answer.proved {
//!     for solution in answer.solutions.into_iter().flatten() {
//!         println!("{:?}", solution.get("Child"));
//!     }
//! }
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod decode;
pub mod error;
pub mod session;
pub mod term;
pub mod transport;
pub mod value;

pub use cache::{CacheEntry, CacheStats, SessionCache};
pub use classifier::{Category, RuleSet, CONSULT_RULES, GOAL_RULES};
pub use config::{Config, EngineConfig, LoggingConfig};
pub use decode::{decode_bindings, parse_value};
pub use error::{DriverError, DriverResult};
pub use session::{Answer, MessageSink, Session, SessionState, Solutions};
pub use term::{build_goal, encode, encode_atom, quote_string, Arg, Record, Term, ToTerm};
pub use transport::{PtyTransport, ScriptedTransport, SentLog, Transport};
pub use value::{Solution, Value};
