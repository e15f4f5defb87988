//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `ideas`    | `Ideas`          |
//! | `tutorial` | `Tutorial`       |
//! | `stages`   | `Stages`         |

pub mod ideas;
pub mod serve;
pub mod stages;
pub mod tutorial;

pub use ideas::cmd_ideas;
pub use serve::cmd_serve;
pub use stages::cmd_stages;
pub use tutorial::cmd_tutorial;
