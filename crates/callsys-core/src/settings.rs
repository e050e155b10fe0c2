//! System flags and display content.
//!
//! Each setter returns the event announcing the new value. The featured
//! list is stored as one JSON value and edited read-modify-write.

use callsys_db::{StateStore, setting};
use callsys_types::{BroadcastEvent, FeaturedContent, SystemMode};

use crate::error::QueueError;
use crate::validate;

/// Typed access to the settings kept in the state store.
#[derive(Debug, Clone)]
pub struct Settings {
    state: StateStore,
}

impl Settings {
    /// Settings over `state`.
    pub const fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Whether the system is open to the public. Defaults to open.
    pub async fn is_public(&self) -> Result<bool, QueueError> {
        Ok(self.state.get_flag(setting::IS_PUBLIC, true).await?)
    }

    /// Open or close the system to the public.
    pub async fn set_public(&self, is_public: bool) -> Result<BroadcastEvent, QueueError> {
        self.state.set_flag(setting::IS_PUBLIC, is_public).await?;
        Ok(BroadcastEvent::PublicStatus { is_public })
    }

    /// Whether displays play call sounds. Defaults to on.
    pub async fn sound_enabled(&self) -> Result<bool, QueueError> {
        Ok(self.state.get_flag(setting::SOUND_ENABLED, true).await?)
    }

    /// Toggle display sounds.
    pub async fn set_sound(&self, enabled: bool) -> Result<BroadcastEvent, QueueError> {
        self.state.set_flag(setting::SOUND_ENABLED, enabled).await?;
        Ok(BroadcastEvent::SoundSetting { enabled })
    }

    /// Current dispensing mode.
    pub async fn mode(&self) -> Result<SystemMode, QueueError> {
        Ok(self
            .state
            .get_setting(setting::SYSTEM_MODE)
            .await?
            .map_or_else(SystemMode::default, |v| SystemMode::parse_or_default(&v)))
    }

    /// Switch the dispensing mode.
    pub async fn set_mode(&self, mode: SystemMode) -> Result<BroadcastEvent, QueueError> {
        self.state
            .set_setting(setting::SYSTEM_MODE, mode.as_str())
            .await?;
        Ok(BroadcastEvent::SystemModeChanged { mode })
    }

    /// Featured links in display order.
    pub async fn featured(&self) -> Result<Vec<FeaturedContent>, QueueError> {
        Ok(self.state.featured().await?)
    }

    /// Append a featured link, replacing any entry with the same URL.
    pub async fn add_featured(
        &self,
        link_text: &str,
        link_url: &str,
    ) -> Result<BroadcastEvent, QueueError> {
        let item = FeaturedContent {
            link_text: validate::text("link text", link_text)?,
            link_url: validate::url(link_url)?,
        };
        let mut items = self.state.featured().await?;
        items.retain(|i| i.link_url != item.link_url);
        items.push(item);
        self.save_featured(items).await
    }

    /// Remove the featured link pointing at `link_url`.
    pub async fn remove_featured(&self, link_url: &str) -> Result<BroadcastEvent, QueueError> {
        let mut items = self.state.featured().await?;
        let before = items.len();
        items.retain(|i| i.link_url != link_url.trim());
        if items.len() == before {
            return Err(QueueError::NotFound(format!("featured link {link_url:?}")));
        }
        self.save_featured(items).await
    }

    /// Remove every featured link.
    pub async fn clear_featured(&self) -> Result<BroadcastEvent, QueueError> {
        self.save_featured(Vec::new()).await
    }

    async fn save_featured(&self, items: Vec<FeaturedContent>) -> Result<BroadcastEvent, QueueError> {
        self.state.set_featured(&items).await?;
        Ok(BroadcastEvent::FeaturedUpdated { items })
    }

    /// Build a one-off announcement for displays.
    pub fn announce(message: &str) -> Result<BroadcastEvent, QueueError> {
        Ok(BroadcastEvent::Announcement {
            message: validate::text("message", message)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flags_default_open_and_toggle() {
        let settings = Settings::new(StateStore::in_memory());
        assert!(settings.is_public().await.unwrap());
        assert!(settings.sound_enabled().await.unwrap());
        assert_eq!(settings.mode().await.unwrap(), SystemMode::Ticketing);

        let event = settings.set_public(false).await.unwrap();
        assert_eq!(event, BroadcastEvent::PublicStatus { is_public: false });
        assert!(!settings.is_public().await.unwrap());

        settings.set_mode(SystemMode::Input).await.unwrap();
        assert_eq!(settings.mode().await.unwrap(), SystemMode::Input);
    }

    #[tokio::test]
    async fn featured_links_add_replace_remove() {
        let settings = Settings::new(StateStore::in_memory());
        settings
            .add_featured("Menu", "https://example.com/menu")
            .await
            .unwrap();
        settings
            .add_featured("Map", "https://example.com/map")
            .await
            .unwrap();
        settings
            .add_featured("New menu", "https://example.com/menu")
            .await
            .unwrap();

        let items = settings.featured().await.unwrap();
        let texts: Vec<&str> = items.iter().map(|i| i.link_text.as_str()).collect();
        assert_eq!(texts, ["Map", "New menu"]);

        settings
            .remove_featured("https://example.com/map")
            .await
            .unwrap();
        assert!(matches!(
            settings.remove_featured("https://example.com/map").await,
            Err(QueueError::NotFound(_))
        ));
        settings.clear_featured().await.unwrap();
        assert!(settings.featured().await.unwrap().is_empty());
    }

    #[test]
    fn empty_announcement_rejected() {
        assert!(Settings::announce("   ").is_err());
        assert!(Settings::announce("Counter 2 is closed").is_ok());
    }
}
