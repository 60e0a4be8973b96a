//! Map search: queries against OpenStreetMap data rendered as GeoJSON
//! overlays on an in-process map view.

use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use geojson::GeoJson;

pub mod map;
pub mod nominatim;
pub mod overlay;
pub mod overpass;
pub mod render;
pub mod translate;
pub mod util;

/// How a search query should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Geocode a place name via Nominatim.
    Place,
    /// Run the query verbatim against the Overpass interpreter.
    OverpassQl,
    /// Translate natural language to Overpass QL first.
    Natural,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchMode::Place => "place",
            SearchMode::OverpassQl => "overpass",
            SearchMode::Natural => "natural",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "place" => Ok(SearchMode::Place),
            "overpass" => Ok(SearchMode::OverpassQl),
            "natural" => Ok(SearchMode::Natural),
            other => Err(format!("unknown search mode {other:?}")),
        }
    }
}

/// Resolves a query to a GeoJSON feature collection ready for the overlay
/// manager. Upstream failures bubble up to the caller; nothing is retried.
pub async fn search(mode: SearchMode, query: &str) -> anyhow::Result<GeoJson> {
    match mode {
        SearchMode::Place => {
            let params = nominatim::SearchParams::new(query);
            nominatim::search(&params)
                .await
                .context("nominatim search failed")
        }
        SearchMode::OverpassQl => {
            let response = overpass::run_query(query)
                .await
                .context("overpass query failed")?;
            Ok(overpass::to_geojson(response))
        }
        SearchMode::Natural => {
            let translated = translate::to_overpass_ql(query).await?;
            log::debug!(
                "translated {:?}: {}",
                translated.query,
                translated.explanation
            );

            let response = overpass::run_query(&translated.overpass_ql)
                .await
                .context("overpass query failed")?;
            Ok(overpass::to_geojson(response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_mode_round_trips_through_strings() {
        for mode in [SearchMode::Place, SearchMode::OverpassQl, SearchMode::Natural] {
            assert_eq!(mode.to_string().parse::<SearchMode>(), Ok(mode));
        }
        assert!("teleport".parse::<SearchMode>().is_err());
    }
}
