//! Media assembly pipeline.
//!
//! A request flows through the [`StreamSelector`] (validation), then the
//! [`StreamCombiner`] (muxing into a scratch file) and finally [`deliver`],
//! which streams the file out and deletes it. Audio-only requests skip the
//! combiner and go through the [`AudioTranscoder`].

mod combiner;
mod delivery;
mod forward;
mod scratch;
mod selector;
mod transcode;

pub use combiner::{
    AudioCodecPolicy, CombineConfig, CombineError, CombinedFile, JobState, StreamCombiner,
};
pub use delivery::{Delivery, DeliveryStream, TempFile, deliver};
pub use forward::{ForwardOutcome, forward};
pub use scratch::{ARTIFACT_PREFIX, ScratchDir};
pub use selector::{AudioPlan, StreamSelector, VideoPlan};
pub use transcode::{AudioTranscoder, TranscodeStream};
