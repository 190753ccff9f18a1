//! OpenRosa `xformsList` and `xformsManifest` documents.

use roxmltree::{Document, Node};

use crate::{
    hash::{strip_md5_prefix, with_md5_prefix},
    models::server::{MediaFile, ServerFormListItem},
};

pub const FORM_LIST_NAMESPACE: &str = "http://openrosa.org/xforms/xformsList";
pub const MANIFEST_NAMESPACE: &str = "http://openrosa.org/xforms/xformsManifest";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum OpenRosaError {
    #[error("malformed xml: {0}")]
    Xml(String),
    #[error("expected root element <{expected}>, found <{found}>")]
    UnexpectedRoot { expected: &'static str, found: String },
    #[error("<{element}> entry is missing <{field}>")]
    MissingField {
        element: &'static str,
        field: &'static str,
    },
}

pub fn parse_form_list(text: &str) -> Result<Vec<ServerFormListItem>, OpenRosaError> {
    let doc = Document::parse(text).map_err(|e| OpenRosaError::Xml(e.to_string()))?;
    let root = expect_root(&doc, "xforms")?;

    let mut items = Vec::new();
    for xform in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "xform")
    {
        let form_id = required(xform, "xform", "formID")?;
        let download_url = required(xform, "xform", "downloadUrl")?;
        items.push(ServerFormListItem {
            name: field(xform, "name").unwrap_or_else(|| form_id.clone()),
            form_id,
            version: field(xform, "version"),
            hash: field(xform, "hash").map(|x| strip_md5_prefix(&x)),
            download_url,
            manifest_url: field(xform, "manifestUrl"),
        });
    }
    Ok(items)
}

pub fn parse_manifest(text: &str) -> Result<Vec<MediaFile>, OpenRosaError> {
    let doc = Document::parse(text).map_err(|e| OpenRosaError::Xml(e.to_string()))?;
    let root = expect_root(&doc, "manifest")?;

    let mut files = Vec::new();
    for media in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "mediaFile")
    {
        files.push(MediaFile {
            filename: required(media, "mediaFile", "filename")?,
            hash: strip_md5_prefix(&required(media, "mediaFile", "hash")?),
            download_url: required(media, "mediaFile", "downloadUrl")?,
        });
    }
    Ok(files)
}

pub fn render_form_list(items: &[ServerFormListItem]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!("<xforms xmlns=\"{}\">\n", FORM_LIST_NAMESPACE));
    for item in items {
        out.push_str("  <xform>\n");
        push_field(&mut out, "formID", &item.form_id);
        push_field(&mut out, "name", &item.name);
        if let Some(version) = &item.version {
            push_field(&mut out, "version", version);
        }
        if let Some(hash) = &item.hash {
            push_field(&mut out, "hash", &with_md5_prefix(hash));
        }
        push_field(&mut out, "downloadUrl", &item.download_url);
        if let Some(manifest_url) = &item.manifest_url {
            push_field(&mut out, "manifestUrl", manifest_url);
        }
        out.push_str("  </xform>\n");
    }
    out.push_str("</xforms>\n");
    out
}

pub fn render_manifest(files: &[MediaFile]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!("<manifest xmlns=\"{}\">\n", MANIFEST_NAMESPACE));
    for file in files {
        out.push_str("  <mediaFile>\n");
        push_field(&mut out, "filename", &file.filename);
        push_field(&mut out, "hash", &with_md5_prefix(&file.hash));
        push_field(&mut out, "downloadUrl", &file.download_url);
        out.push_str("  </mediaFile>\n");
    }
    out.push_str("</manifest>\n");
    out
}

pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn push_field(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("    <{name}>{}</{name}>\n", escape_xml(value)));
}

fn expect_root<'a, 'input>(
    doc: &'a Document<'input>,
    expected: &'static str,
) -> Result<Node<'a, 'input>, OpenRosaError> {
    let root = doc.root_element();
    if root.tag_name().name() != expected {
        return Err(OpenRosaError::UnexpectedRoot {
            expected,
            found: root.tag_name().name().to_string(),
        });
    }
    Ok(root)
}

fn field(node: Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
}

fn required(
    node: Node,
    element: &'static str,
    name: &'static str,
) -> Result<String, OpenRosaError> {
    field(node, name).ok_or(OpenRosaError::MissingField {
        element,
        field: name,
    })
}
