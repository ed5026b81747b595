//! Minimal PROPFIND multistatus rendering (RFC 4918 §9.1). Covers the
//! properties needed to make a client's directory listing and file stat
//! work; it is not a general property store (§1 Non-goals: no general
//! WebDAV verb state machine beyond the resource-factory contract).

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::domain::file_metadata::FileMetadata;

pub struct PropfindEntry {
    pub href: String,
    pub display_name: String,
    pub is_directory: bool,
    pub size: u64,
    pub content_type: String,
    pub modified_at: chrono::DateTime<chrono::Utc>,
}

impl PropfindEntry {
    pub fn from_metadata(href: String, metadata: &FileMetadata) -> Self {
        Self {
            href,
            display_name: metadata.display_name.clone(),
            is_directory: metadata.is_directory,
            size: metadata.size,
            content_type: metadata.content_type.clone(),
            modified_at: metadata.modified_at,
        }
    }
}

/// Renders a `207 Multi-Status` response body for the given entries.
pub fn render_multistatus(entries: &[PropfindEntry]) -> String {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(
            BytesStart::new("D:multistatus").with_attributes([("xmlns:D", "DAV:")]),
        ))
        .unwrap();

    for entry in entries {
        write_response(&mut writer, entry);
    }

    writer.write_event(Event::End(BytesEnd::new("D:multistatus"))).unwrap();
    String::from_utf8(writer.into_inner()).expect("xml writer produces valid utf8")
}

fn write_response(writer: &mut Writer<Vec<u8>>, entry: &PropfindEntry) {
    writer.write_event(Event::Start(BytesStart::new("D:response"))).unwrap();
    write_text_element(writer, "D:href", &entry.href);

    writer.write_event(Event::Start(BytesStart::new("D:propstat"))).unwrap();
    writer.write_event(Event::Start(BytesStart::new("D:prop"))).unwrap();

    write_text_element(writer, "D:displayname", &entry.display_name);
    if entry.is_directory {
        writer.write_event(Event::Start(BytesStart::new("D:resourcetype"))).unwrap();
        writer
            .write_event(Event::Empty(BytesStart::new("D:collection")))
            .unwrap();
        writer.write_event(Event::End(BytesEnd::new("D:resourcetype"))).unwrap();
    } else {
        writer
            .write_event(Event::Empty(BytesStart::new("D:resourcetype")))
            .unwrap();
        write_text_element(writer, "D:getcontentlength", &entry.size.to_string());
        write_text_element(writer, "D:getcontenttype", &entry.content_type);
    }
    write_text_element(writer, "D:getlastmodified", &entry.modified_at.to_rfc2822());

    writer.write_event(Event::End(BytesEnd::new("D:prop"))).unwrap();
    write_text_element(writer, "D:status", "HTTP/1.1 200 OK");
    writer.write_event(Event::End(BytesEnd::new("D:propstat"))).unwrap();

    writer.write_event(Event::End(BytesEnd::new("D:response"))).unwrap();
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) {
    writer.write_event(Event::Start(BytesStart::new(tag))).unwrap();
    writer.write_event(Event::Text(BytesText::new(text))).unwrap();
    writer.write_event(Event::End(BytesEnd::new(tag))).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_file_entry_with_content_length() {
        let now = chrono::Utc::now();
        let entry = PropfindEntry {
            href: "/dav/a.txt".to_string(),
            display_name: "a.txt".to_string(),
            is_directory: false,
            size: 42,
            content_type: "text/plain".to_string(),
            modified_at: now,
        };
        let xml = render_multistatus(&[entry]);
        assert!(xml.contains("<D:href>/dav/a.txt</D:href>"));
        assert!(xml.contains("<D:getcontentlength>42</D:getcontentlength>"));
    }

    #[test]
    fn renders_a_collection_without_content_length() {
        let now = chrono::Utc::now();
        let entry = PropfindEntry {
            href: "/dav/docs".to_string(),
            display_name: "docs".to_string(),
            is_directory: true,
            size: 0,
            content_type: String::new(),
            modified_at: now,
        };
        let xml = render_multistatus(&[entry]);
        assert!(xml.contains("<D:collection/>"));
        assert!(!xml.contains("getcontentlength"));
    }
}
