//! In-process terminal testing
//!
//! A [`Session`] gives a program under test a real tty while the test sees
//! its output two ways:
//!
//! - as a **stream** of raw bytes, consumed once by [`Session::expect`] and
//!   friends;
//! - as a **rendered view** of a fixed-size grid, checked any number of
//!   times by [`Session::contains`] and friends.
//!
//! [`Session::wait_for_idle`] decides when output has settled by watching
//! the grid's cursor.
//!
//! ```no_run
//! use termscope::Session;
//!
//! # fn main() -> Result<(), termscope::Error> {
//! let mut session = Session::builder().size(24, 80).build()?;
//! session.write_str("Hello, World!")?;
//! session.expect_string(&["Hello"])?;
//! session.contains_string(&["Hello, World!"])?;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod idle;
pub mod matcher;
mod pump;
pub mod session;
mod stream;
pub mod view;

pub use cancel::Cancellation;
pub use config::{Config, ConfigError};
pub use error::{Error, MismatchError};
pub use matcher::{Criteria, Matcher, Needle, Observation};
pub use session::{Session, SessionBuilder, Writer};
pub use terminal::{Cursor, Grid};
pub use view::Viewer;
