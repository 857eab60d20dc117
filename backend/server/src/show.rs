//! # Shows
//!
//! Catalog records. The playback URL is the protected part of a show: it is
//! only handed out through [`Show::project`] with a full access decision.
//!
//! Redaction removes the key from the serialized record rather than nulling
//! it, so clients can tell "not entitled" apart from "entitled, but the URL
//! is empty".
use serde::{Deserialize, Serialize};

use crate::entitlement::Decision;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    pub id: String,
    pub name: String,
    pub image: String,
    pub rating: f64,
    pub description: String,
    pub playback_url: String,
}

impl Show {
    pub fn project(self, decision: Decision) -> ShowView {
        let playback_url = match decision {
            Decision::FullAccess => Some(self.playback_url),
            Decision::RedactedAccess => None,
        };

        ShowView {
            id: self.id,
            name: self.name,
            image: self.image,
            rating: self.rating,
            description: self.description,
            playback_url,
        }
    }
}

/// A [`Show`] as returned to a particular caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowView {
    pub id: String,
    pub name: String,
    pub image: String,
    pub rating: f64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShow {
    pub name: String,
    pub image: String,
    pub rating: f64,
    pub description: String,
    #[serde(alias = "url")]
    pub playback_url: String,
}

impl NewShow {
    /// Every field is required and a zero rating counts as missing.
    pub fn validate(&self) -> Result<(), &'static str> {
        let texts = [
            &self.name,
            &self.image,
            &self.description,
            &self.playback_url,
        ];

        if texts.iter().any(|text| text.trim().is_empty()) || self.rating == 0.0 {
            return Err("All fields are required");
        }
        if !self.rating.is_finite() {
            return Err("Rating must be a number");
        }

        Ok(())
    }

    pub fn into_show(self, id: String) -> Show {
        Show {
            id,
            name: self.name,
            image: self.image,
            rating: self.rating,
            description: self.description,
            playback_url: self.playback_url,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowPatch {
    pub name: Option<String>,
    pub image: Option<String>,
    pub rating: Option<f64>,
    pub description: Option<String>,
    #[serde(alias = "url")]
    pub playback_url: Option<String>,
}

impl ShowPatch {
    pub fn validate(&self) -> Result<(), &'static str> {
        let texts = [
            &self.name,
            &self.image,
            &self.description,
            &self.playback_url,
        ];

        if texts
            .iter()
            .any(|text| text.as_deref().is_some_and(|text| text.trim().is_empty()))
        {
            return Err("Fields must not be empty");
        }
        if self.rating.is_some_and(|rating| !rating.is_finite()) {
            return Err("Rating must be a number");
        }

        Ok(())
    }

    pub fn apply(self, show: &mut Show) {
        if let Some(name) = self.name {
            show.name = name;
        }
        if let Some(image) = self.image {
            show.image = image;
        }
        if let Some(rating) = self.rating {
            show.rating = rating;
        }
        if let Some(description) = self.description {
            show.description = description;
        }
        if let Some(playback_url) = self.playback_url {
            show.playback_url = playback_url;
        }
    }
}
