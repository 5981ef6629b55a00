//! Media selection: what the user picked and whether it is the right kind.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, ValidationError};

/// Extensions accepted as audio when the declared type is not `audio/*`.
pub const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "mp4", "ogg", "m4a", "aac"];

/// A picked file: name, the media type the host declared for it, and its
/// contents. Contents never leave the process except inside an upload.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub name: String,
    pub declared_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

impl FileHandle {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads `path` and declares its type from the extension, the way a
    /// browser file picker would. Unknown extensions declare an empty type.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let declared_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();
        debug!(file = %name, declared_type = %declared_type, size = bytes.len(), "loaded file");
        Ok(Self {
            name,
            declared_type,
            bytes,
        })
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Lower-cased text after the last `.`, or the whole name if there is none.
    pub fn extension(&self) -> String {
        self.name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    pub fn is_image_like(&self) -> bool {
        self.declared_type.starts_with("image/")
    }

    pub fn is_audio_like(&self) -> bool {
        self.declared_type.starts_with("audio/")
            || AUDIO_EXTENSIONS.contains(&self.extension().as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedMedia {
    pub image: Option<FileHandle>,
    pub audio: Option<FileHandle>,
}

impl SelectedMedia {
    pub fn select_image(&mut self, file: FileHandle) -> Result<(), ValidationError> {
        if !file.is_image_like() {
            return Err(ValidationError::NotAnImage {
                name: file.name,
                declared_type: file.declared_type,
            });
        }
        self.image = Some(file);
        Ok(())
    }

    pub fn select_audio(&mut self, file: FileHandle) -> Result<(), ValidationError> {
        if !file.is_audio_like() {
            return Err(ValidationError::NotAnAudioClip {
                name: file.name,
                declared_type: file.declared_type,
            });
        }
        self.audio = Some(file);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.image.is_some() && self.audio.is_some()
    }

    pub fn clear(&mut self) {
        self.image = None;
        self.audio = None;
    }
}
