//! SOAP envelopes for the Metadata API calls that have no REST form
//! (`retrieve`, `checkRetrieveStatus`, `describeMetadata`).
//!
//! Responses are parsed into a small element tree and then picked apart by
//! local name; namespaces prefixes are ignored.

use base64::Engine as _;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use metasync_core::{DescribedType, Members, PackageManifest};

use crate::api::{FileProperties, JobId, RetrieveMessage, RetrieveResult};
use crate::error::RemoteError;
use crate::time::parse_remote_timestamp;

const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const METADATA_NS: &str = "http://soap.sforce.com/2006/04/metadata";

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    fn bool_of(&self, name: &str) -> bool {
        self.text_of(name) == Some("true")
    }

    fn string_of(&self, name: &str) -> Option<String> {
        self.text_of(name)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    }

    /// Depth-first search for the first element named `name`.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// Parse a document into its root element, keyed by local names.
pub fn parse_tree(document: &[u8]) -> Result<XmlNode, RemoteError> {
    let mut reader = Reader::from_reader(document);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => stack.push(XmlNode {
                name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ..XmlNode::default()
            }),
            Event::Empty(e) => {
                let node = XmlNode {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    ..XmlNode::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(node) = stack.pop() else {
                    return Err(RemoteError::Decode("unbalanced XML response".into()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Event::Eof => {
                return Err(RemoteError::Decode("truncated XML response".into()));
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Locate `<result>` inside the body, turning a SOAP fault into an error.
fn response_result(document: &[u8]) -> Result<XmlNode, RemoteError> {
    let root = parse_tree(document)?;
    if let Some(fault) = root.find("Fault") {
        return Err(RemoteError::Api {
            code: fault.text_of("faultcode").unwrap_or("Fault").to_owned(),
            message: fault.text_of("faultstring").unwrap_or_default().to_owned(),
        });
    }
    root.find("result")
        .cloned()
        .ok_or_else(|| RemoteError::Decode("SOAP response has no <result>".into()))
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

fn envelope(session_id: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"{ENVELOPE_NS}\" xmlns:met=\"{METADATA_NS}\">\
         <soapenv:Header><met:SessionHeader><met:sessionId>{}</met:sessionId></met:SessionHeader></soapenv:Header>\
         <soapenv:Body>{body}</soapenv:Body>\
         </soapenv:Envelope>",
        escape(session_id)
    )
}

pub fn retrieve_request(session_id: &str, api_version: &str, manifest: &PackageManifest) -> String {
    let mut unpackaged = String::new();
    for (xml_name, members) in manifest.types() {
        unpackaged.push_str("<met:types>");
        match members {
            Members::All => unpackaged.push_str("<met:members>*</met:members>"),
            Members::Named(names) => {
                for name in names {
                    unpackaged.push_str(&format!("<met:members>{}</met:members>", escape(name)));
                }
            }
        }
        unpackaged.push_str(&format!("<met:name>{}</met:name></met:types>", escape(xml_name)));
    }
    let version = manifest.version().unwrap_or(api_version);
    unpackaged.push_str(&format!("<met:version>{}</met:version>", escape(version)));

    let body = format!(
        "<met:retrieve><met:retrieveRequest>\
         <met:apiVersion>{}</met:apiVersion>\
         <met:singlePackage>true</met:singlePackage>\
         <met:unpackaged>{unpackaged}</met:unpackaged>\
         </met:retrieveRequest></met:retrieve>",
        escape(api_version)
    );
    envelope(session_id, &body)
}

pub fn check_retrieve_status_request(session_id: &str, job: &JobId) -> String {
    let body = format!(
        "<met:checkRetrieveStatus>\
         <met:asyncProcessId>{}</met:asyncProcessId>\
         <met:includeZip>true</met:includeZip>\
         </met:checkRetrieveStatus>",
        escape(&job.0)
    );
    envelope(session_id, &body)
}

pub fn describe_request(session_id: &str, api_version: &str) -> String {
    let body = format!(
        "<met:describeMetadata><met:asOfVersion>{}</met:asOfVersion></met:describeMetadata>",
        escape(api_version)
    );
    envelope(session_id, &body)
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

pub fn parse_retrieve_response(document: &[u8]) -> Result<JobId, RemoteError> {
    let result = response_result(document)?;
    result
        .string_of("id")
        .map(JobId)
        .ok_or_else(|| RemoteError::Decode("retrieve response carries no job id".into()))
}

pub fn parse_retrieve_status(document: &[u8]) -> Result<RetrieveResult, RemoteError> {
    let result = response_result(document)?;
    let zip_file = match result.text_of("zipFile").filter(|z| !z.is_empty()) {
        Some(encoded) => Some(base64::engine::general_purpose::STANDARD.decode(encoded.trim())?),
        None => None,
    };
    let file_properties = result
        .children("fileProperties")
        .map(file_properties)
        .collect::<Result<Vec<_>, _>>()?;
    let messages = result
        .children("messages")
        .map(|m| RetrieveMessage {
            file_name: m.text_of("fileName").unwrap_or_default().to_owned(),
            problem: m.text_of("problem").unwrap_or_default().to_owned(),
        })
        .collect();

    Ok(RetrieveResult {
        id: JobId(result.text_of("id").unwrap_or_default().to_owned()),
        done: result.bool_of("done"),
        success: result.bool_of("success"),
        status: result.text_of("status").unwrap_or_default().to_owned(),
        error_message: result.string_of("errorMessage"),
        file_properties,
        messages,
        zip_file,
    })
}

fn file_properties(node: &XmlNode) -> Result<FileProperties, RemoteError> {
    let required = |field: &str| {
        node.string_of(field)
            .ok_or_else(|| RemoteError::Decode(format!("fileProperties missing <{field}>")))
    };
    Ok(FileProperties {
        full_name: required("fullName")?,
        file_name: required("fileName")?,
        type_name: required("type")?,
        id: node.string_of("id").map(Into::into),
        last_modified_date: node.text_of("lastModifiedDate").and_then(parse_remote_timestamp),
        last_modified_by_id: node.string_of("lastModifiedById"),
        last_modified_by_name: node.string_of("lastModifiedByName"),
        created_date: node.text_of("createdDate").and_then(parse_remote_timestamp),
        manageable_state: node.string_of("manageableState"),
    })
}

pub fn parse_describe(document: &[u8]) -> Result<Vec<DescribedType>, RemoteError> {
    let result = response_result(document)?;
    result
        .children("metadataObjects")
        .map(|obj| {
            Ok(DescribedType {
                xml_name: obj
                    .string_of("xmlName")
                    .ok_or_else(|| RemoteError::Decode("metadataObjects missing <xmlName>".into()))?,
                directory_name: obj.text_of("directoryName").unwrap_or_default().to_owned(),
                suffix: obj.string_of("suffix"),
                in_folder: obj.bool_of("inFolder"),
                meta_file: obj.bool_of("metaFile"),
                child_xml_names: obj
                    .children("childXmlNames")
                    .map(|c| c.text.clone())
                    .collect(),
            })
        })
        .collect()
}
