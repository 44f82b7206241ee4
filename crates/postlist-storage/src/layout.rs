//! Artifact directory layout of one request.
//!
//! ```text
//! <work_dir>/<request_id>/
//!   result.json
//!   images/            ordered final images (NN_<name>)
//!   video.mp4          optional
//!   media/             downloaded stills of an image post
//!   caption.txt
//!   transcript.txt
//!   frames/            sampled candidates
//!     relevant/
//!     non_relevant/
//!   frames.json
//! ```

use std::path::{Path, PathBuf};

use postlist_models::RequestId;

pub const RESULT_FILE: &str = "result.json";
pub const IMAGES_DIR: &str = "images";
pub const VIDEO_FILE: &str = "video.mp4";
pub const MEDIA_DIR: &str = "media";
pub const CAPTION_FILE: &str = "caption.txt";
pub const TRANSCRIPT_FILE: &str = "transcript.txt";
pub const AUDIO_FILE: &str = "audio.wav";
pub const FRAMES_DIR: &str = "frames";
pub const RELEVANT_DIR: &str = "relevant";
pub const NON_RELEVANT_DIR: &str = "non_relevant";
pub const FRAMES_MANIFEST: &str = "frames.json";

/// Image extensions served from `images/`.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Paths inside one request's artifact directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDir {
    id: RequestId,
    root: PathBuf,
}

impl RequestDir {
    pub(crate) fn new(work_dir: &Path, id: RequestId) -> Self {
        let root = work_dir.join(id.as_str());
        Self { id, root }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn result_file(&self) -> PathBuf {
        self.root.join(RESULT_FILE)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn video_file(&self) -> PathBuf {
        self.root.join(VIDEO_FILE)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join(MEDIA_DIR)
    }

    pub fn caption_file(&self) -> PathBuf {
        self.root.join(CAPTION_FILE)
    }

    pub fn transcript_file(&self) -> PathBuf {
        self.root.join(TRANSCRIPT_FILE)
    }

    pub fn audio_file(&self) -> PathBuf {
        self.root.join(AUDIO_FILE)
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    pub fn relevant_dir(&self) -> PathBuf {
        self.frames_dir().join(RELEVANT_DIR)
    }

    pub fn non_relevant_dir(&self) -> PathBuf {
        self.frames_dir().join(NON_RELEVANT_DIR)
    }

    pub fn frames_manifest(&self) -> PathBuf {
        self.root.join(FRAMES_MANIFEST)
    }

    /// File name for the image at `rank` in the final ordering.
    ///
    /// The two-digit prefix keeps a sorted directory listing in rank order.
    pub fn ranked_image_name(rank: usize, original: &str) -> String {
        format!("{:02}_{}", rank, original)
    }
}
