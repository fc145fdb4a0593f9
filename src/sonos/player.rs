use super::soap::{extract_text, SoapClient, AV_TRANSPORT, RENDERING_CONTROL, ZONE_GROUP_TOPOLOGY};
use super::topology;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::{self, Instant};

#[cfg(test)]
use mockall::automock;

pub const DEFAULT_PORT: u16 = 1400;

const STATE_PLAYING: &str = "PLAYING";
const STATE_TRANSITIONING: &str = "TRANSITIONING";
const QUEUE_URI_PREFIX: &str = "x-rincon-queue:";
const NOTIFICATION_POLL_INTERVAL: Duration = Duration::from_millis(500);
const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for [`Player::play_notification`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uri: String,
    pub volume: u8,
    pub only_when_playing: bool,
}

/// Item for [`Player::queue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub uri: String,
    pub metadata: String,
}

/// Control calls the controller issues against one player.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Player: Send + Sync {
    async fn play(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn toggle_playback(&self) -> Result<()>;
    async fn set_muted(&self, muted: bool) -> Result<()>;
    async fn next(&self) -> Result<()>;
    async fn previous(&self) -> Result<()>;
    /// Joins the group of the player whose room name is `target`.
    async fn join_group(&self, target: &str) -> Result<()>;
    async fn leave_group(&self) -> Result<()>;
    /// Sets the transport URI and starts playback.
    async fn set_av_transport_uri(&self, uri: &str) -> Result<()>;
    async fn set_volume(&self, volume: u8) -> Result<()>;
    async fn adjust_volume(&self, delta: i8) -> Result<()>;
    async fn play_notification(&self, notification: &Notification) -> Result<()>;
    async fn queue(&self, item: &QueueItem) -> Result<()>;
}

/// What was playing before a notification took over the player.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlaybackSnapshot {
    transport_state: String,
    volume: u8,
    uri: String,
    metadata: String,
    /// Queue position, only kept when the queue was the source.
    track: Option<String>,
    rel_time: Option<String>,
}

/// A player reached over SOAP.
#[derive(Debug, Clone)]
pub struct SonosPlayer {
    pub(crate) soap: SoapClient,
}

impl SonosPlayer {
    pub fn new(host: &str, port: u16) -> Self {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        Self::from_base_url(format!("http://{}:{}", host, port))
    }

    pub fn from_base_url(base_url: impl Into<String>) -> Self {
        Self {
            soap: SoapClient::new(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        self.soap.base_url()
    }

    async fn transport(&self, action: &str, extra: &[(&str, &str)]) -> Result<()> {
        let mut args = vec![("InstanceID", "0")];
        args.extend_from_slice(extra);
        self.soap.call(AV_TRANSPORT, action, &args).await.map(|_| ())
    }

    async fn rendering(&self, action: &str, extra: &[(&str, &str)]) -> Result<()> {
        let mut args = vec![("InstanceID", "0"), ("Channel", "Master")];
        args.extend_from_slice(extra);
        self.soap.call(RENDERING_CONTROL, action, &args).await.map(|_| ())
    }

    async fn set_uri(&self, uri: &str, metadata: &str) -> Result<()> {
        self.transport("SetAVTransportURI", &[("CurrentURI", uri), ("CurrentURIMetaData", metadata)])
            .await
    }

    async fn transport_state(&self) -> Result<String> {
        self.soap
            .call_for(AV_TRANSPORT, "GetTransportInfo", &[("InstanceID", "0")], "CurrentTransportState")
            .await
    }

    async fn volume(&self) -> Result<u8> {
        let volume = self
            .soap
            .call_for(
                RENDERING_CONTROL,
                "GetVolume",
                &[("InstanceID", "0"), ("Channel", "Master")],
                "CurrentVolume",
            )
            .await?;
        volume
            .trim()
            .parse()
            .with_context(|| format!("Invalid CurrentVolume {}", volume))
    }

    async fn snapshot(&self, transport_state: String) -> Result<PlaybackSnapshot> {
        let volume = self.volume().await?;
        let media = self.soap.call(AV_TRANSPORT, "GetMediaInfo", &[("InstanceID", "0")]).await?;
        let uri = extract_text(&media, "CurrentURI")?.unwrap_or_default();
        let metadata = extract_text(&media, "CurrentURIMetaData")?.unwrap_or_default();

        let (track, rel_time) = if uri.starts_with(QUEUE_URI_PREFIX) {
            let position = self
                .soap
                .call(AV_TRANSPORT, "GetPositionInfo", &[("InstanceID", "0")])
                .await?;
            (extract_text(&position, "Track")?, extract_text(&position, "RelTime")?)
        } else {
            (None, None)
        };

        Ok(PlaybackSnapshot {
            transport_state,
            volume,
            uri,
            metadata,
            track,
            rel_time,
        })
    }

    /// Polls until the notification stops playing or the timeout passes.
    async fn wait_until_finished(&self) -> Result<()> {
        let deadline = Instant::now() + NOTIFICATION_TIMEOUT;
        loop {
            time::sleep(NOTIFICATION_POLL_INTERVAL).await;
            let state = self.transport_state().await?;
            if state != STATE_PLAYING && state != STATE_TRANSITIONING {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("notification still {} after {:?} - restoring anyway", state, NOTIFICATION_TIMEOUT);
                return Ok(());
            }
        }
    }

    async fn restore(&self, snapshot: &PlaybackSnapshot) -> Result<()> {
        debug!("restoring {:?}", snapshot);
        self.set_volume(snapshot.volume).await?;
        if snapshot.uri.is_empty() {
            return Ok(());
        }
        self.set_uri(&snapshot.uri, &snapshot.metadata).await?;
        if let Some(track) = snapshot.track.as_deref() {
            self.transport("Seek", &[("Unit", "TRACK_NR"), ("Target", track)]).await?;
            if let Some(rel_time) = snapshot.rel_time.as_deref() {
                self.transport("Seek", &[("Unit", "REL_TIME"), ("Target", rel_time)]).await?;
            }
        }
        if snapshot.transport_state == STATE_PLAYING {
            self.play().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Player for SonosPlayer {
    async fn play(&self) -> Result<()> {
        self.transport("Play", &[("Speed", "1")]).await
    }

    async fn pause(&self) -> Result<()> {
        self.transport("Pause", &[]).await
    }

    async fn stop(&self) -> Result<()> {
        self.transport("Stop", &[]).await
    }

    async fn toggle_playback(&self) -> Result<()> {
        let state = self.transport_state().await?;
        debug!("transport state before toggle: {}", state);
        if state == STATE_PLAYING {
            self.pause().await
        } else {
            self.play().await
        }
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.rendering("SetMute", &[("DesiredMute", if muted { "1" } else { "0" })])
            .await
    }

    async fn next(&self) -> Result<()> {
        self.transport("Next", &[]).await
    }

    async fn previous(&self) -> Result<()> {
        self.transport("Previous", &[]).await
    }

    async fn join_group(&self, target: &str) -> Result<()> {
        let state = self
            .soap
            .call_for(ZONE_GROUP_TOPOLOGY, "GetZoneGroupState", &[], "ZoneGroupState")
            .await?;
        let coordinator = topology::find_group_coordinator(&state, target)?
            .ok_or_else(|| anyhow!("no player named {} in this household", target))?;
        self.set_uri(&format!("x-rincon:{}", coordinator), "").await
    }

    async fn leave_group(&self) -> Result<()> {
        self.transport("BecomeCoordinatorOfStandaloneGroup", &[]).await
    }

    async fn set_av_transport_uri(&self, uri: &str) -> Result<()> {
        self.set_uri(uri, "").await?;
        self.play().await
    }

    async fn set_volume(&self, volume: u8) -> Result<()> {
        self.rendering("SetVolume", &[("DesiredVolume", volume.to_string().as_str())])
            .await
    }

    async fn adjust_volume(&self, delta: i8) -> Result<()> {
        self.rendering("SetRelativeVolume", &[("Adjustment", delta.to_string().as_str())])
            .await
    }

    /// Plays `notification.uri` at the given volume, waits for it to end and
    /// puts back the volume, source, queue position and playing state.
    async fn play_notification(&self, notification: &Notification) -> Result<()> {
        let transport_state = self.transport_state().await?;
        if notification.only_when_playing && transport_state != STATE_PLAYING {
            debug!("player not playing - notification skipped");
            return Ok(());
        }
        let snapshot = self.snapshot(transport_state).await?;

        self.set_volume(notification.volume).await?;
        self.set_uri(&notification.uri, "").await?;
        self.play().await?;
        self.wait_until_finished().await?;

        self.restore(&snapshot).await
    }

    async fn queue(&self, item: &QueueItem) -> Result<()> {
        self.transport(
            "AddURIToQueue",
            &[
                ("EnqueuedURI", item.uri.as_str()),
                ("EnqueuedURIMetaData", item.metadata.as_str()),
                ("DesiredFirstTrackNumberEnqueued", "0"),
                ("EnqueueAsNext", "0"),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const TRANSPORT_INFO_PLAYING: &str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:GetTransportInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"><CurrentTransportState>PLAYING</CurrentTransportState><CurrentTransportStatus>OK</CurrentTransportStatus><CurrentSpeed>1</CurrentSpeed></u:GetTransportInfoResponse></s:Body></s:Envelope>"#;

    fn action(name: &str) -> String {
        format!("\"urn:schemas-upnp-org:service:AVTransport:1#{}\"", name)
    }

    #[test]
    fn test_new_brackets_ipv6_hosts() {
        assert_eq!(SonosPlayer::new("192.168.1.20", DEFAULT_PORT).base_url(), "http://192.168.1.20:1400");
        assert_eq!(SonosPlayer::new("fe80::1", DEFAULT_PORT).base_url(), "http://[fe80::1]:1400");
    }

    #[tokio::test]
    async fn test_set_volume_sends_desired_volume() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/MediaRenderer/RenderingControl/Control")
            .match_header("SOAPAction", "\"urn:schemas-upnp-org:service:RenderingControl:1#SetVolume\"")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("<Channel>Master</Channel>".to_string()),
                Matcher::Regex("<DesiredVolume>55</DesiredVolume>".to_string()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        SonosPlayer::from_base_url(server.url()).set_volume(55).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_adjust_volume_uses_relative_volume() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/MediaRenderer/RenderingControl/Control")
            .match_body(Matcher::Regex("<Adjustment>-5</Adjustment>".to_string()))
            .with_status(200)
            .create_async()
            .await;

        SonosPlayer::from_base_url(server.url()).adjust_volume(-5).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_toggle_playback_pauses_when_playing() {
        let mut server = mockito::Server::new_async().await;
        let info = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .match_header("SOAPAction", action("GetTransportInfo").as_str())
            .with_status(200)
            .with_body(TRANSPORT_INFO_PLAYING)
            .create_async()
            .await;
        let pause = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .match_header("SOAPAction", action("Pause").as_str())
            .with_status(200)
            .create_async()
            .await;

        SonosPlayer::from_base_url(server.url()).toggle_playback().await.unwrap();
        info.assert_async().await;
        pause.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_av_transport_uri_also_plays() {
        let mut server = mockito::Server::new_async().await;
        let set = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .match_header("SOAPAction", action("SetAVTransportURI").as_str())
            .match_body(Matcher::Regex("<CurrentURI>x-sonosapi-stream:s1234</CurrentURI>".to_string()))
            .with_status(200)
            .create_async()
            .await;
        let play = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .match_header("SOAPAction", action("Play").as_str())
            .with_status(200)
            .create_async()
            .await;

        SonosPlayer::from_base_url(server.url())
            .set_av_transport_uri("x-sonosapi-stream:s1234")
            .await
            .unwrap();
        set.assert_async().await;
        play.assert_async().await;
    }

    #[tokio::test]
    async fn test_queue_escapes_metadata() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .match_header("SOAPAction", action("AddURIToQueue").as_str())
            .match_body(Matcher::Regex(
                "<EnqueuedURIMetaData>&lt;DIDL-Lite&gt;&lt;/DIDL-Lite&gt;</EnqueuedURIMetaData>".to_string(),
            ))
            .with_status(200)
            .create_async()
            .await;

        let item = QueueItem {
            uri: "x-rincon-cpcontainer:abc".to_string(),
            metadata: "<DIDL-Lite></DIDL-Lite>".to_string(),
        };
        SonosPlayer::from_base_url(server.url()).queue(&item).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_call_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .with_status(500)
            .create_async()
            .await;

        assert!(SonosPlayer::from_base_url(server.url()).stop().await.is_err());
    }

    fn rendering_action(name: &str) -> String {
        format!("\"urn:schemas-upnp-org:service:RenderingControl:1#{}\"", name)
    }

    fn envelope(action: &str, service: &str, body: &str) -> String {
        format!(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:{action}Response xmlns:u="urn:schemas-upnp-org:service:{service}:1">{body}</u:{action}Response></s:Body></s:Envelope>"#
        )
    }

    fn transport_info(state: &str) -> String {
        envelope(
            "GetTransportInfo",
            "AVTransport",
            &format!("<CurrentTransportState>{}</CurrentTransportState><CurrentTransportStatus>OK</CurrentTransportStatus>", state),
        )
    }

    #[tokio::test]
    async fn test_notification_restores_queue_playback() {
        let mut server = mockito::Server::new_async().await;
        let av = "/MediaRenderer/AVTransport/Control";
        let rc = "/MediaRenderer/RenderingControl/Control";

        // first state read sees the queue playing, the next one the finished notification
        let before = server
            .mock("POST", av)
            .match_header("SOAPAction", action("GetTransportInfo").as_str())
            .with_status(200)
            .with_body(transport_info("PLAYING"))
            .expect(1)
            .create_async()
            .await;
        let after = server
            .mock("POST", av)
            .match_header("SOAPAction", action("GetTransportInfo").as_str())
            .with_status(200)
            .with_body(transport_info("STOPPED"))
            .expect(1)
            .create_async()
            .await;
        let get_volume = server
            .mock("POST", rc)
            .match_header("SOAPAction", rendering_action("GetVolume").as_str())
            .with_status(200)
            .with_body(envelope("GetVolume", "RenderingControl", "<CurrentVolume>12</CurrentVolume>"))
            .create_async()
            .await;
        let media_info = server
            .mock("POST", av)
            .match_header("SOAPAction", action("GetMediaInfo").as_str())
            .with_status(200)
            .with_body(envelope(
                "GetMediaInfo",
                "AVTransport",
                "<NrTracks>8</NrTracks><CurrentURI>x-rincon-queue:RINCON_000E58A0000001400#0</CurrentURI><CurrentURIMetaData></CurrentURIMetaData>",
            ))
            .create_async()
            .await;
        let position_info = server
            .mock("POST", av)
            .match_header("SOAPAction", action("GetPositionInfo").as_str())
            .with_status(200)
            .with_body(envelope(
                "GetPositionInfo",
                "AVTransport",
                "<Track>3</Track><RelTime>0:01:23</RelTime>",
            ))
            .create_async()
            .await;
        let notification_volume = server
            .mock("POST", rc)
            .match_header("SOAPAction", rendering_action("SetVolume").as_str())
            .match_body(Matcher::Regex("<DesiredVolume>40</DesiredVolume>".to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let restored_volume = server
            .mock("POST", rc)
            .match_header("SOAPAction", rendering_action("SetVolume").as_str())
            .match_body(Matcher::Regex("<DesiredVolume>12</DesiredVolume>".to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let notification_uri = server
            .mock("POST", av)
            .match_header("SOAPAction", action("SetAVTransportURI").as_str())
            .match_body(Matcher::Regex("<CurrentURI>http://host/doorbell.mp3</CurrentURI>".to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let restored_uri = server
            .mock("POST", av)
            .match_header("SOAPAction", action("SetAVTransportURI").as_str())
            .match_body(Matcher::Regex(
                "<CurrentURI>x-rincon-queue:RINCON_000E58A0000001400#0</CurrentURI>".to_string(),
            ))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let seek_track = server
            .mock("POST", av)
            .match_header("SOAPAction", action("Seek").as_str())
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("<Unit>TRACK_NR</Unit>".to_string()),
                Matcher::Regex("<Target>3</Target>".to_string()),
            ]))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let seek_time = server
            .mock("POST", av)
            .match_header("SOAPAction", action("Seek").as_str())
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("<Unit>REL_TIME</Unit>".to_string()),
                Matcher::Regex("<Target>0:01:23</Target>".to_string()),
            ]))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let play = server
            .mock("POST", av)
            .match_header("SOAPAction", action("Play").as_str())
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let notification = Notification {
            uri: "http://host/doorbell.mp3".to_string(),
            volume: 40,
            only_when_playing: false,
        };
        SonosPlayer::from_base_url(server.url())
            .play_notification(&notification)
            .await
            .unwrap();

        for mock in [
            before,
            after,
            get_volume,
            media_info,
            position_info,
            notification_volume,
            restored_volume,
            notification_uri,
            restored_uri,
            seek_track,
            seek_time,
            play,
        ] {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_notification_skipped_when_not_playing() {
        let mut server = mockito::Server::new_async().await;
        let info = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .match_header("SOAPAction", action("GetTransportInfo").as_str())
            .with_status(200)
            .with_body(transport_info("PAUSED_PLAYBACK"))
            .expect(1)
            .create_async()
            .await;
        let rendering = server
            .mock("POST", "/MediaRenderer/RenderingControl/Control")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let notification = Notification {
            uri: "http://host/doorbell.mp3".to_string(),
            volume: 40,
            only_when_playing: true,
        };
        SonosPlayer::from_base_url(server.url())
            .play_notification(&notification)
            .await
            .unwrap();
        info.assert_async().await;
        rendering.assert_async().await;
    }

    #[tokio::test]
    async fn test_join_group_targets_group_coordinator() {
        let zone_group_state = quick_xml::escape::escape(
            r#"<ZoneGroupState><ZoneGroups><ZoneGroup Coordinator="RINCON_A" ID="RINCON_A:3"><ZoneGroupMember UUID="RINCON_A" ZoneName="Living Room"/><ZoneGroupMember UUID="RINCON_B" ZoneName="Kitchen"/></ZoneGroup></ZoneGroups></ZoneGroupState>"#,
        )
        .into_owned();

        let mut server = mockito::Server::new_async().await;
        let topology = server
            .mock("POST", "/ZoneGroupTopology/Control")
            .with_status(200)
            .with_body(envelope(
                "GetZoneGroupState",
                "ZoneGroupTopology",
                &format!("<ZoneGroupState>{}</ZoneGroupState>", zone_group_state),
            ))
            .create_async()
            .await;
        let join = server
            .mock("POST", "/MediaRenderer/AVTransport/Control")
            .match_header("SOAPAction", action("SetAVTransportURI").as_str())
            .match_body(Matcher::Regex("<CurrentURI>x-rincon:RINCON_A</CurrentURI>".to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        SonosPlayer::from_base_url(server.url()).join_group("Kitchen").await.unwrap();
        topology.assert_async().await;
        join.assert_async().await;
    }
}
