use std::str::FromStr;

use anyhow::{Context, Result};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::config::ThemeName;
use crate::storage::{KeyValueStore, SIDEBAR_KEY, THEME_KEY};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreferenceError {
    #[error("unknown theme '{0}' (expected dark or light)")]
    InvalidTheme(String),
    #[error("unknown sidebar state '{0}' (expected open or closed)")]
    InvalidSidebar(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SidebarState {
    #[default]
    Open,
    Closed,
}

impl SidebarState {
    pub fn toggled(self) -> Self {
        match self {
            SidebarState::Open => SidebarState::Closed,
            SidebarState::Closed => SidebarState::Open,
        }
    }

    pub fn is_open(self) -> bool {
        self == SidebarState::Open
    }
}

pub fn parse_theme(raw: &str) -> Result<ThemeName, PreferenceError> {
    ThemeName::from_str(raw.trim()).map_err(|_| PreferenceError::InvalidTheme(raw.to_string()))
}

pub fn parse_sidebar(raw: &str) -> Result<SidebarState, PreferenceError> {
    SidebarState::from_str(raw.trim())
        .map_err(|_| PreferenceError::InvalidSidebar(raw.to_string()))
}

/// UI flags persisted next to the feed under their own keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub theme: ThemeName,
    pub sidebar: SidebarState,
}

impl Preferences {
    /// Missing or unrecognised values fall back to `default_theme` and an open sidebar.
    pub fn load<S>(storage: &S, default_theme: ThemeName) -> Result<Self>
    where
        S: KeyValueStore + ?Sized,
    {
        let theme = match storage.get(THEME_KEY).context("reading theme preference")? {
            Some(raw) => parse_theme(&raw).unwrap_or_else(|err| {
                tracing::warn!(%err, "ignoring stored theme");
                default_theme
            }),
            None => default_theme,
        };
        let sidebar = match storage
            .get(SIDEBAR_KEY)
            .context("reading sidebar preference")?
        {
            Some(raw) => parse_sidebar(&raw).unwrap_or_else(|err| {
                tracing::warn!(%err, "ignoring stored sidebar state");
                SidebarState::default()
            }),
            None => SidebarState::default(),
        };
        Ok(Self { theme, sidebar })
    }

    pub fn set_theme<S>(&mut self, storage: &S, theme: ThemeName) -> Result<()>
    where
        S: KeyValueStore + ?Sized,
    {
        storage
            .set(THEME_KEY, theme.as_ref())
            .context("saving theme preference")?;
        self.theme = theme;
        Ok(())
    }

    pub fn set_sidebar<S>(&mut self, storage: &S, sidebar: SidebarState) -> Result<()>
    where
        S: KeyValueStore + ?Sized,
    {
        storage
            .set(SIDEBAR_KEY, sidebar.as_ref())
            .context("saving sidebar preference")?;
        self.sidebar = sidebar;
        Ok(())
    }

    pub fn toggle_theme<S>(&mut self, storage: &S) -> Result<ThemeName>
    where
        S: KeyValueStore + ?Sized,
    {
        let next = self.theme.toggled();
        self.set_theme(storage, next)?;
        Ok(next)
    }

    pub fn toggle_sidebar<S>(&mut self, storage: &S) -> Result<SidebarState>
    where
        S: KeyValueStore + ?Sized,
    {
        let next = self.sidebar.toggled();
        self.set_sidebar(storage, next)?;
        Ok(next)
    }
}
