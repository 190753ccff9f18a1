use std::path::Path;

use formsync_core::xform::{parse_xform_file, FormMetadata, XFormError};

/// Extracts catalog metadata from a form definition on disk.
pub trait FormMetadataParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<FormMetadata, XFormError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct XFormMetadataParser;

impl FormMetadataParser for XFormMetadataParser {
    fn parse(&self, path: &Path) -> Result<FormMetadata, XFormError> {
        parse_xform_file(path)
    }
}
