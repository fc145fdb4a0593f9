use anyhow::{anyhow, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Reads the `UUID` and `ZoneName` attributes of one `ZoneGroupMember`.
fn member_attributes(e: &BytesStart<'_>) -> Result<(Option<String>, Option<String>)> {
    let mut uuid = None;
    let mut zone_name = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.local_name().as_ref() {
            b"UUID" => uuid = Some(attr.unescape_value()?.into_owned()),
            b"ZoneName" => zone_name = Some(attr.unescape_value()?.into_owned()),
            _ => (),
        }
    }
    Ok((uuid, zone_name))
}

fn coordinator_attribute(e: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"Coordinator" {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// UUID of the coordinator of the group holding the room named `room_name`,
/// ignoring case. Falls back to the member's own UUID when its group names no
/// coordinator. `zone_group_state` is the already unescaped `ZoneGroupState`
/// document.
pub fn find_group_coordinator(zone_group_state: &str, room_name: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(zone_group_state);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut coordinator: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().local_name().as_ref() == b"ZoneGroup" => {
                coordinator = coordinator_attribute(e)?;
            }
            Ok(Event::End(ref e)) if e.name().local_name().as_ref() == b"ZoneGroup" => {
                coordinator = None;
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().local_name().as_ref() == b"ZoneGroupMember" =>
            {
                if let (Some(uuid), Some(name)) = member_attributes(e)? {
                    if name.eq_ignore_ascii_case(room_name) {
                        return Ok(Some(coordinator.unwrap_or(uuid)));
                    }
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(anyhow!("Error parsing zone group state: {}", e)),
            _ => (),
        }
        buf.clear();
    }
}
