pub mod asset;
pub mod check;
pub mod events;

pub use asset::{Asset, AssetError, AssetRegistry};
pub use check::{Check, CheckStatus, TransitionError};
pub use events::{
    CheckCompleted, CheckFailed, CheckRequested, Event, EventDecodeError, EventPayload, EventType,
    ReportReady,
};
