use crate::command::{self, BasicCommand, Classification, Command, MySonosAction};
use crate::error::CommandError;
use crate::message::InputMessage;
use crate::mysonos;
use crate::outcome::{Outcome, OutcomeReporter};
use crate::sonos::{CatalogSource, Notification, Player, QueueItem};
use crate::volume;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Mutex;

/// Label used for failures found before a command is known.
pub const INPUT_LABEL: &str = "handle input msg";

/// What a completed action changes on the forwarded message.
#[derive(Debug)]
enum ActionOutput {
    Unchanged,
    Export(crate::message::ExportItem),
    Items(Vec<mysonos::CatalogEntry>),
}

/// Runs pipeline messages against a player and reports one outcome each.
pub struct Controller<R> {
    reporter: R,
    warned_aliases: Mutex<HashSet<&'static str>>,
}

impl<R: OutcomeReporter> Controller<R> {
    pub fn new(reporter: R) -> Self {
        Self {
            reporter,
            warned_aliases: Mutex::new(HashSet::new()),
        }
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn report_failure(&self, label: &str, error: CommandError) {
        self.reporter.report(Outcome::Failure {
            label: label.to_string(),
            error,
        });
    }

    /// Classifies, validates and executes `msg`. Never fails; the result is
    /// always handed to the reporter.
    pub async fn handle(&self, mut msg: InputMessage, player: &dyn Player, catalog: &dyn CatalogSource) {
        debug!("msg received");
        let token = match msg.command_token() {
            Ok(token) => token,
            Err(e) => return self.report_failure(INPUT_LABEL, e),
        };

        let classified = match command::classify(&token) {
            Classification::Known(classified) => classified,
            Classification::Unrecognized(token) => {
                return self.reporter.report(Outcome::Warning {
                    label: INPUT_LABEL.to_string(),
                    detail: format!("invalid command: {}", token),
                });
            }
        };
        if let Some(replacement) = classified.replacement {
            self.warn_deprecated(&classified.token, replacement);
        }

        let label = classified.kind.label();
        let command = match command::build(&classified, &msg) {
            Ok(command) => command,
            Err(e) => return self.report_failure(label, e),
        };

        match self.execute(command, &msg, player, catalog).await {
            Ok(output) => {
                if let Err(e) = apply_output(&mut msg, output) {
                    return self.report_failure(label, e);
                }
                self.reporter.report(Outcome::Success {
                    label: label.to_string(),
                    msg,
                });
            }
            Err(e) => self.report_failure(label, e),
        }
    }

    fn warn_deprecated(&self, alias: &str, replacement: &'static str) {
        let mut warned = match self.warned_aliases.lock() {
            Ok(warned) => warned,
            Err(poisoned) => poisoned.into_inner(),
        };
        if warned.insert(replacement) {
            warn!("{} is deprecated. Please use {}", alias, replacement);
        }
    }

    async fn execute(
        &self,
        command: Command,
        msg: &InputMessage,
        player: &dyn Player,
        catalog: &dyn CatalogSource,
    ) -> Result<ActionOutput, CommandError> {
        match command {
            Command::Basic(basic) => {
                self.execute_basic(basic, msg, player).await?;
            }
            Command::VolumeSet(volume) => player.set_volume(volume.get()).await?,
            Command::VolumeAdjust(delta) => player.adjust_volume(delta.get()).await?,
            Command::PlayNotification { uri, volume } => {
                let notification = Notification {
                    uri,
                    volume: volume.get(),
                    only_when_playing: false,
                };
                player.play_notification(&notification).await?;
            }
            Command::PlayUriDirect { uri } => player.set_av_transport_uri(&uri).await?,
            Command::MySonos(action) => return self.execute_mysonos(action, msg, player, catalog).await,
        }
        Ok(ActionOutput::Unchanged)
    }

    async fn execute_basic(
        &self,
        command: BasicCommand,
        msg: &InputMessage,
        player: &dyn Player,
    ) -> Result<(), CommandError> {
        match command {
            BasicCommand::Play => {
                player.play().await?;
                apply_post_volume(msg, player).await?;
            }
            BasicCommand::Pause => player.pause().await?,
            BasicCommand::Stop => player.stop().await?,
            BasicCommand::TogglePlayback => player.toggle_playback().await?,
            BasicCommand::Mute => player.set_muted(true).await?,
            BasicCommand::Unmute => player.set_muted(false).await?,
            // Only some services support next/previous (e.g. Amazon Prime).
            BasicCommand::NextSong => player.next().await?,
            BasicCommand::PreviousSong => player.previous().await?,
            BasicCommand::LeaveGroup => player.leave_group().await?,
            BasicCommand::JoinGroup { target } => player.join_group(&target).await?,
            BasicCommand::ActivateAvTransport { uri } => {
                player.set_av_transport_uri(&uri).await?;
                apply_post_volume(msg, player).await?;
            }
        }
        Ok(())
    }

    async fn execute_mysonos(
        &self,
        action: MySonosAction,
        msg: &InputMessage,
        player: &dyn Player,
        catalog: &dyn CatalogSource,
    ) -> Result<ActionOutput, CommandError> {
        let items = catalog.fetch_catalog().await?;
        match action {
            MySonosAction::List => {
                if items.is_empty() {
                    return Err(CommandError::EmptyCatalog);
                }
                Ok(ActionOutput::Items(items))
            }
            MySonosAction::Export { search } => {
                let found = mysonos::resolve(&items, &search, None)?;
                debug!("found >>{:?}", found.title);
                Ok(ActionOutput::Export(found.export_item()))
            }
            MySonosAction::Queue { search, filter } => {
                let found = mysonos::resolve(&items, &search, Some(&filter))?;
                debug!("found >>{:?}", found.title);
                let item = QueueItem {
                    uri: found.uri.clone(),
                    metadata: found.metadata.clone(),
                };
                player.queue(&item).await?;
                Ok(ActionOutput::Unchanged)
            }
            MySonosAction::Stream { search, filter } => {
                let found = mysonos::resolve(&items, &search, Some(&filter))?;
                debug!("found >>{:?}", found.title);
                player.set_av_transport_uri(&found.uri).await?;
                apply_post_volume(msg, player).await?;
                Ok(ActionOutput::Unchanged)
            }
        }
    }
}

/// Optional volume change after a playback action. The playback call has
/// already gone out when this fails, yet the whole action is reported failed.
async fn apply_post_volume(msg: &InputMessage, player: &dyn Player) -> Result<(), CommandError> {
    let Some(token) = msg.volume_token() else {
        return Ok(());
    };
    let volume = volume::parse_volume(&token)?;
    player.set_volume(volume.get()).await?;
    Ok(())
}

fn apply_output(msg: &mut InputMessage, output: ActionOutput) -> Result<(), CommandError> {
    match output {
        ActionOutput::Unchanged => Ok(()),
        ActionOutput::Export(item) => {
            msg.set_export(item);
            Ok(())
        }
        ActionOutput::Items(items) => msg
            .set_items(&items)
            .map_err(|e| CommandError::DeviceRpcFailure(e.into())),
    }
}
