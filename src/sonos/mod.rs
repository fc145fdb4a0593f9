mod favorites;
mod player;
mod soap;
mod topology;

pub use favorites::{parse_favorites, CatalogSource};
pub use player::{Notification, Player, QueueItem, SonosPlayer, DEFAULT_PORT};

#[cfg(test)]
pub(crate) use favorites::MockCatalogSource;
#[cfg(test)]
pub(crate) use player::MockPlayer;
