use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// A UPnP service hosted by a player.
#[derive(Debug, Clone, Copy)]
pub struct Service {
    pub urn: &'static str,
    pub control_path: &'static str,
}

pub const AV_TRANSPORT: Service = Service {
    urn: "urn:schemas-upnp-org:service:AVTransport:1",
    control_path: "/MediaRenderer/AVTransport/Control",
};

pub const RENDERING_CONTROL: Service = Service {
    urn: "urn:schemas-upnp-org:service:RenderingControl:1",
    control_path: "/MediaRenderer/RenderingControl/Control",
};

pub const CONTENT_DIRECTORY: Service = Service {
    urn: "urn:schemas-upnp-org:service:ContentDirectory:1",
    control_path: "/MediaServer/ContentDirectory/Control",
};

pub const ZONE_GROUP_TOPOLOGY: Service = Service {
    urn: "urn:schemas-upnp-org:service:ZoneGroupTopology:1",
    control_path: "/ZoneGroupTopology/Control",
};

/// SOAP transport to a single player.
#[derive(Debug, Clone)]
pub struct SoapClient {
    client: reqwest::Client,
    base_url: String,
}

impl SoapClient {
    /// `base_url` is scheme, host and port, e.g. `http://192.168.1.20:1400`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Invokes `action` on `service` and returns the raw response body.
    pub async fn call(&self, service: Service, action: &str, args: &[(&str, &str)]) -> Result<String> {
        let arguments: String = args
            .iter()
            .map(|(name, value)| format!("<{name}>{}</{name}>", escape(value)))
            .collect();
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{urn}">{arguments}</u:{action}></s:Body></s:Envelope>"#,
            urn = service.urn,
        );

        let response = self
            .client
            .post(format!("{}{}", self.base_url, service.control_path))
            .header("SOAPAction", format!("\"{}#{}\"", service.urn, action))
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to Sonos player", action))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", action))?;
        debug!("Raw SOAP response for {}: {}", action, response_text);

        if !status.is_success() {
            let code = extract_text(&response_text, "errorCode")
                .ok()
                .flatten()
                .unwrap_or_else(|| "unknown".to_string());
            bail!("{} failed with HTTP {} (UPnP error {})", action, status, code);
        }
        Ok(response_text)
    }

    /// Like [`call`](Self::call) but returns the text of one response element.
    pub async fn call_for(
        &self,
        service: Service,
        action: &str,
        args: &[(&str, &str)],
        element: &str,
    ) -> Result<String> {
        let response = self.call(service, action, args).await?;
        extract_text(&response, element)?
            .ok_or_else(|| anyhow!("{} response has no {} element", action, element))
    }
}

/// Unescaped text of the first element named `local_name`, prefix ignored.
/// `Ok(None)` when no such element exists.
pub fn extract_text(xml: &str, local_name: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut inside = false;
    let mut value = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if !inside && e.name().local_name().as_ref() == local_name.as_bytes() => {
                inside = true;
            }
            Ok(Event::Empty(ref e)) if !inside && e.name().local_name().as_ref() == local_name.as_bytes() => {
                return Ok(Some(String::new()));
            }
            Ok(Event::Text(e)) if inside => {
                value.push_str(&e.unescape().context("Failed to unescape XML text")?);
            }
            Ok(Event::CData(e)) if inside => {
                value.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(ref e)) if inside && e.name().local_name().as_ref() == local_name.as_bytes() => {
                return Ok(Some(value));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("Error parsing XML: {}", e)),
            _ => (),
        }
        buf.clear();
    }

    if inside {
        Err(anyhow!("Unterminated element {}", local_name))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const FAULT_RESPONSE: &str = r#"<?xml version="1.0"?>
        <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
            <s:Body>
                <s:Fault>
                    <faultcode>s:Client</faultcode>
                    <faultstring>UPnPError</faultstring>
                    <detail><UPnPError xmlns="urn:schemas-upnp-org:control-1-0"><errorCode>701</errorCode></UPnPError></detail>
                </s:Fault>
            </s:Body>
        </s:Envelope>"#;

    #[test]
    fn test_extract_text_with_prefix_and_entities() {
        let xml = r#"<u:GetTransportInfoResponse xmlns:u="urn:x"><CurrentTransportState>PLAYING</CurrentTransportState><Note>Rock &amp; Roll</Note></u:GetTransportInfoResponse>"#;
        assert_eq!(extract_text(xml, "CurrentTransportState").unwrap().as_deref(), Some("PLAYING"));
        assert_eq!(extract_text(xml, "Note").unwrap().as_deref(), Some("Rock & Roll"));
        assert_eq!(extract_text(xml, "Missing").unwrap(), None);
    }

    #[test]
    fn test_extract_text_empty_element() {
        let xml = r#"<r><CurrentURIMetaData/></r>"#;
        assert_eq!(extract_text(xml, "CurrentURIMetaData").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_extract_text_malformed_xml() {
        assert!(extract_text("<r><a>open</r>", "a").is_err());
    }

    #[tokio::test]
    async fn test_call_sends_envelope_with_escaped_args() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .match_header("SOAPAction", "\"urn:schemas-upnp-org:service:AVTransport:1#SetAVTransportURI\"")
            .match_body(Matcher::Regex(
                "<CurrentURI>http://host/a.mp3\\?x=1&amp;y=2</CurrentURI>".to_string(),
            ))
            .with_status(200)
            .with_body("<ok/>")
            .create_async()
            .await;

        let client = SoapClient::new(server.url());
        client
            .call(
                AV_TRANSPORT,
                "SetAVTransportURI",
                &[("InstanceID", "0"), ("CurrentURI", "http://host/a.mp3?x=1&y=2"), ("CurrentURIMetaData", "")],
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_reports_upnp_fault() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .with_status(500)
            .with_body(FAULT_RESPONSE)
            .create_async()
            .await;

        let client = SoapClient::new(server.url());
        let err = client.call(AV_TRANSPORT, "Play", &[("InstanceID", "0")]).await.unwrap_err();
        assert!(err.to_string().contains("701"), "unexpected error: {}", err);
    }
}
