#[macro_use]
pub mod macros;

pub mod credentials;
pub mod fs_json_util;

#[doc(hidden)]
pub mod __private {
    pub use once_cell;
    pub use regex;
}
