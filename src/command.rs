use crate::error::CommandError;
use crate::message::InputMessage;
use crate::mysonos::{Filter, ProcessingType};
use crate::volume::{self, Volume, VolumeDelta};
use log::debug;

/// Fixed-name player actions that need no parameter from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicAction {
    Play,
    Pause,
    Stop,
    TogglePlayback,
    Mute,
    Unmute,
    NextSong,
    PreviousSong,
    JoinGroup,
    LeaveGroup,
    ActivateAvTransport,
}

const BASIC_COMMANDS: &[(&str, BasicAction)] = &[
    ("play", BasicAction::Play),
    ("pause", BasicAction::Pause),
    ("stop", BasicAction::Stop),
    ("toggleplayback", BasicAction::TogglePlayback),
    ("mute", BasicAction::Mute),
    ("unmute", BasicAction::Unmute),
    ("next_song", BasicAction::NextSong),
    ("previous_song", BasicAction::PreviousSong),
    ("join_group", BasicAction::JoinGroup),
    ("leave_group", BasicAction::LeaveGroup),
    ("activate_avtransport", BasicAction::ActivateAvTransport),
];

impl BasicAction {
    pub fn name(self) -> &'static str {
        BASIC_COMMANDS
            .iter()
            .find(|(_, action)| *action == self)
            .map(|(name, _)| *name)
            .unwrap_or("basic")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MySonosKind {
    Export,
    Queue,
    Stream,
    List,
}

const MYSONOS_COMMANDS: &[(&str, MySonosKind)] = &[
    ("export", MySonosKind::Export),
    ("queue", MySonosKind::Queue),
    ("stream", MySonosKind::Stream),
    ("get.items", MySonosKind::List),
];

/// Outdated spellings: alias, kind, current spelling.
const DEPRECATED_ALIASES: &[(&str, CommandKind, &str)] = &[
    ("lab_play_notification", CommandKind::PlayNotification, "play_notification"),
    ("export.item", CommandKind::MySonos(MySonosKind::Export), "export"),
    ("get_items", CommandKind::MySonos(MySonosKind::List), "get.items"),
];

/// What a payload names, before any field of the message is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Basic(BasicAction),
    PlayNotification,
    PlayUriDirect,
    VolumeIncrease,
    VolumeDecrease,
    VolumeSet,
    MySonos(MySonosKind),
}

impl CommandKind {
    /// Label under which the outcome of this kind is reported.
    pub fn label(self) -> &'static str {
        match self {
            CommandKind::Basic(action) => action.name(),
            CommandKind::PlayNotification => "play notification",
            CommandKind::PlayUriDirect => "lab play uri",
            CommandKind::VolumeIncrease => "volume_increase",
            CommandKind::VolumeDecrease => "volume_decrease",
            CommandKind::VolumeSet => "volume_set",
            CommandKind::MySonos(MySonosKind::Export) => "get my sonos",
            CommandKind::MySonos(MySonosKind::Queue) => "queue my sonos item",
            CommandKind::MySonos(MySonosKind::Stream) => "play my sonos stream",
            CommandKind::MySonos(MySonosKind::List) => "get My Sonos items",
        }
    }
}

/// A recognized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: CommandKind,
    /// The lowercased payload; the numeric source for volume kinds.
    pub token: String,
    /// Current spelling, when the payload used a deprecated alias.
    pub replacement: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Known(Classified),
    Unrecognized(String),
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Classifies a lowercased payload. First match wins.
pub fn classify(token: &str) -> Classification {
    let known = |kind, replacement| {
        Classification::Known(Classified {
            kind,
            token: token.to_string(),
            replacement,
        })
    };

    if let Some((_, action)) = BASIC_COMMANDS.iter().find(|(name, _)| *name == token) {
        return known(CommandKind::Basic(*action), None);
    }
    if token == "play_notification" {
        return known(CommandKind::PlayNotification, None);
    }
    if let Some((_, kind, replacement)) = DEPRECATED_ALIASES
        .iter()
        .find(|(alias, kind, _)| *alias == token && *kind == CommandKind::PlayNotification)
    {
        return known(*kind, Some(*replacement));
    }
    if token == "lab_play_uri" {
        return known(CommandKind::PlayUriDirect, None);
    }
    if token.starts_with('+') {
        return known(CommandKind::VolumeIncrease, None);
    }
    if token.starts_with('-') {
        return known(CommandKind::VolumeDecrease, None);
    }
    if is_digits(token.trim()) {
        return known(CommandKind::VolumeSet, None);
    }
    if let Some((_, kind)) = MYSONOS_COMMANDS.iter().find(|(name, _)| *name == token) {
        return known(CommandKind::MySonos(*kind), None);
    }
    if let Some((_, kind, replacement)) = DEPRECATED_ALIASES.iter().find(|(alias, _, _)| *alias == token) {
        return known(*kind, Some(*replacement));
    }
    Classification::Unrecognized(token.to_string())
}

/// Basic command with its target, if it needs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasicCommand {
    Play,
    Pause,
    Stop,
    TogglePlayback,
    Mute,
    Unmute,
    NextSong,
    PreviousSong,
    LeaveGroup,
    JoinGroup { target: String },
    ActivateAvTransport { uri: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MySonosAction {
    Export { search: String },
    Queue { search: String, filter: Filter },
    Stream { search: String, filter: Filter },
    List,
}

/// A fully validated command, ready for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Basic(BasicCommand),
    VolumeSet(Volume),
    VolumeAdjust(VolumeDelta),
    PlayNotification { uri: String, volume: Volume },
    PlayUriDirect { uri: String },
    MySonos(MySonosAction),
}

/// Checks the fields `classified` needs and builds its command. Nothing here
/// talks to a device.
pub fn build(classified: &Classified, msg: &InputMessage) -> Result<Command, CommandError> {
    let command = match classified.kind {
        CommandKind::Basic(action) => Command::Basic(match action {
            BasicAction::Play => BasicCommand::Play,
            BasicAction::Pause => BasicCommand::Pause,
            BasicAction::Stop => BasicCommand::Stop,
            BasicAction::TogglePlayback => BasicCommand::TogglePlayback,
            BasicAction::Mute => BasicCommand::Mute,
            BasicAction::Unmute => BasicCommand::Unmute,
            BasicAction::NextSong => BasicCommand::NextSong,
            BasicAction::PreviousSong => BasicCommand::PreviousSong,
            BasicAction::LeaveGroup => BasicCommand::LeaveGroup,
            BasicAction::JoinGroup => BasicCommand::JoinGroup {
                target: msg.required_topic()?,
            },
            BasicAction::ActivateAvTransport => BasicCommand::ActivateAvTransport {
                uri: msg.required_topic()?,
            },
        }),
        CommandKind::PlayNotification => {
            let uri = msg.required_topic()?.trim().to_string();
            let volume = volume::notification_volume(msg.volume_token().as_deref());
            debug!("notification volume {}", volume.get());
            Command::PlayNotification { uri, volume }
        }
        CommandKind::PlayUriDirect => Command::PlayUriDirect {
            uri: msg.required_topic()?.trim().to_string(),
        },
        CommandKind::VolumeIncrease | CommandKind::VolumeDecrease => {
            Command::VolumeAdjust(volume::parse_volume_delta(&classified.token)?)
        }
        CommandKind::VolumeSet => Command::VolumeSet(volume::parse_volume(&classified.token)?),
        CommandKind::MySonos(kind) => Command::MySonos(match kind {
            MySonosKind::Export => MySonosAction::Export {
                search: msg.required_topic()?,
            },
            MySonosKind::Queue => {
                let search = msg.required_topic()?;
                let filter = Filter::from_selection(ProcessingType::Queue, msg.filter_selection()?);
                debug!("filter value >>{:?}", filter);
                MySonosAction::Queue { search, filter }
            }
            MySonosKind::Stream => {
                let search = msg.required_topic()?;
                let filter = Filter::from_selection(ProcessingType::Stream, msg.filter_selection()?);
                debug!("filter value >>{:?}", filter);
                MySonosAction::Stream { search, filter }
            }
            MySonosKind::List => MySonosAction::List,
        }),
    };
    Ok(command)
}
