//! Typed identifiers and frame addressing.
//!
//! Every id the pipeline passes between components is a distinct
//! newtype. Node kind and topic routing are never inferred from the
//! contents of an id string.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Frame counter shared by every source in a pipeline.
pub type FrameNumber = u64;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// One camera (realtime) or one source video file (posthoc).
    CameraId
);
string_id!(
    /// A set of cameras captured together; posthoc pipelines derive this
    /// from the recording directory name.
    CameraGroupId
);
string_id!(
    /// One launched pipeline instance.
    PipelineId
);

/// Inclusive frame range for posthoc processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: FrameNumber,
    pub end: FrameNumber,
}

impl FrameRange {
    pub fn new(start: FrameNumber, end: FrameNumber) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, frame: FrameNumber) -> bool {
        frame >= self.start && frame <= self.end
    }

    /// Number of frames in the range (inclusive bounds).
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_id_display_and_from() {
        let id = CameraId::from("cam0");
        assert_eq!(id.to_string(), "cam0");
        assert_eq!(id.as_str(), "cam0");
        assert_eq!(id, CameraId::new("cam0".to_string()));
    }

    #[test]
    fn frame_range_inclusive() {
        let range = FrameRange::new(10, 12);
        assert!(range.contains(10));
        assert!(range.contains(12));
        assert!(!range.contains(13));
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn frame_range_inverted_is_empty() {
        let range = FrameRange::new(5, 2);
        assert!(range.is_empty());
        assert!(!range.contains(3));
    }
}
