pub mod err;
pub mod gate;
pub mod recoverer;
pub mod state;

pub use err::RecoverError;
pub use gate::call_if_empty;
pub use recoverer::{Downloader, Recoverer};
pub use state::{RecoveryState, Stage};
