use bon::Builder;

/// Knobs for [`crate::models::cgfx::Cgfx::save_with`].
///
/// The defaults reproduce a loaded file byte for byte.
#[derive(Builder, Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SaveOptions {
    /// Share storage between raw blobs with identical contents.
    ///
    /// Off by default: files in the wild keep duplicate texture and buffer data
    /// as separate copies, and merging them changes the layout.
    #[builder(default)]
    pub dedup_blobs: bool,
    /// Header size to write instead of the one the file was loaded with.
    pub header_size: Option<u16>,
}
