//! Metadata extraction from XForm definitions.
//!
//! Only the fields the catalog needs are read; the form body is ignored.

use std::path::Path;

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum XFormError {
    #[error("{file}: i/o error: {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },
    #[error("{file}: malformed xml: {message}")]
    Xml { file: String, message: String },
    #[error("{file}: form has no title")]
    MissingTitle { file: String },
    #[error("{file}: form has no id")]
    MissingFormId { file: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct FormMetadata {
    pub title: String,
    pub form_id: String,
    pub version: Option<String>,
    pub submission_uri: Option<String>,
    pub base64_rsa_public_key: Option<String>,
    pub auto_delete: Option<String>,
    pub auto_send: Option<String>,
    pub geometry_xpath: Option<String>,
}

pub fn parse_xform_file<P>(path: P) -> Result<FormMetadata, XFormError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = path
        .file_name()
        .map(|x| x.to_string_lossy().to_string())
        .unwrap_or_default();
    let text = std::fs::read_to_string(path).map_err(|source| XFormError::Io {
        file: file.clone(),
        source,
    })?;
    parse_xform(&file, &text)
}

/// `file` is only used to give errors some context.
pub fn parse_xform(file: &str, text: &str) -> Result<FormMetadata, XFormError> {
    let doc = Document::parse(text).map_err(|e| XFormError::Xml {
        file: file.to_string(),
        message: e.to_string(),
    })?;

    let head = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "head");

    let title = head
        .and_then(|head| child_element(head, "title"))
        .and_then(|n| n.text())
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .ok_or_else(|| XFormError::MissingTitle {
            file: file.to_string(),
        })?;

    let model = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "model");

    // The primary instance is the first one without an id attribute.
    let main_root = model
        .and_then(|model| {
            model
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "instance")
                .find(|n| n.attribute("id").is_none())
        })
        .and_then(|instance| instance.children().find(|n| n.is_element()));

    let form_id = main_root
        .and_then(|root| root.attribute("id"))
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .ok_or_else(|| XFormError::MissingFormId {
            file: file.to_string(),
        })?;

    let version = main_root
        .and_then(|root| local_attribute(root, "version"))
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty());

    let submission = model.and_then(|model| child_element(model, "submission"));
    let submission_uri = submission
        .and_then(|n| n.attribute("action"))
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty());
    let base64_rsa_public_key = submission
        .and_then(|n| n.attribute("base64RsaPublicKey"))
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty());
    let auto_delete = submission
        .and_then(|n| local_attribute(n, "auto-delete"))
        .map(|x| x.trim().to_string());
    let auto_send = submission
        .and_then(|n| local_attribute(n, "auto-send"))
        .map(|x| x.trim().to_string());

    let geometry_xpath = model.and_then(|model| {
        model
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "bind")
            .find(|n| n.attribute("type") == Some("geopoint"))
            .and_then(|n| n.attribute("nodeset"))
            .map(|x| x.to_string())
    });

    Ok(FormMetadata {
        title,
        form_id,
        version,
        submission_uri,
        base64_rsa_public_key,
        auto_delete,
        auto_send,
        geometry_xpath,
    })
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Matches an attribute by local name, whatever namespace it was declared in.
fn local_attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == name)
        .map(|a| a.value())
}
