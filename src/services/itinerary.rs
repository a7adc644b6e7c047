//! Itinerary ordering.
//!
//! A trip's locations carry an `order` that is always exactly `0..n`. New stops
//! are appended at `order = count`, and moves renumber the whole trip, so the
//! invariant never depends on which two positions a move touched.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    models::{coords::Coordinates, location::Location},
    services::{
        geocoding::Geocoder,
        locations::LocationStore,
    },
};

/// Moves the element at `from` to `to` and renumbers every element.
///
/// Returns `None` when either index is out of bounds or both are equal; the
/// caller keeps its sequence and must not persist anything.
pub fn move_item(sequence: &[Location], from: i64, to: i64) -> Option<Vec<Location>> {
    let len = sequence.len() as i64;
    if from == to || !(0..len).contains(&from) || !(0..len).contains(&to) {
        return None;
    }

    let mut next = sequence.to_vec();
    let item = next.remove(from as usize);
    next.insert(to as usize, item);
    renumber(&mut next);
    Some(next)
}

pub fn renumber(sequence: &mut [Location]) {
    for (index, location) in sequence.iter_mut().enumerate() {
        location.order = index as i64;
    }
}

/// True when the `order` values are exactly `0..len`, each once.
pub fn is_gapless(sequence: &[Location]) -> bool {
    let mut seen = vec![false; sequence.len()];
    for location in sequence {
        let Ok(index) = usize::try_from(location.order) else {
            return false;
        };
        match seen.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

fn validate_title(title: &str) -> Result<&str, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("location name is required"));
    }
    Ok(title)
}

/// Appends a stop at the end of the trip, numbered from the current count.
pub async fn append_location(
    store: &LocationStore,
    trip_id: &str,
    title: &str,
    lat: f64,
    lng: f64,
) -> Result<Location, AppError> {
    let title = validate_title(title)?;
    let coords = Coordinates::new(lat, lng)?;

    let location = store.append(trip_id, title, coords).await?;
    info!(
        "appended location {} to trip {trip_id} at position {}",
        location.id, location.order
    );
    Ok(location)
}

/// Resolves a free-text address first, then appends it under that address as title.
pub async fn append_address(
    store: &LocationStore,
    geocoder: &dyn Geocoder,
    trip_id: &str,
    address: &str,
) -> Result<Location, AppError> {
    let address = validate_title(address)?;
    let Some(coords) = geocoder.geocode_address(address).await? else {
        return Err(AppError::validation(format!(
            "could not find a place called \"{address}\""
        )));
    };
    append_location(store, trip_id, address, coords.lat, coords.lng).await
}

/// Persists a full new ordering. `ordered_ids` must be a permutation of the
/// trip's current location ids; position in the list becomes the new order.
pub async fn reorder(
    store: &LocationStore,
    trip_id: &str,
    ordered_ids: &[String],
) -> Result<(), AppError> {
    let current = store.list_by_trip(trip_id).await?;

    let known: HashSet<&str> = current.iter().map(|l| l.id.as_str()).collect();
    let requested: HashSet<&str> = ordered_ids.iter().map(String::as_str).collect();
    if ordered_ids.len() != current.len() || requested.len() != ordered_ids.len() || requested != known
    {
        return Err(AppError::validation(
            "reorder must list every location of the trip exactly once",
        ));
    }

    let unchanged = current
        .iter()
        .zip(ordered_ids)
        .all(|(location, id)| &location.id == id);
    if unchanged {
        debug!("reorder of trip {trip_id} is a no-op");
        return Ok(());
    }

    let mapping: Vec<(String, i64)> = ordered_ids
        .iter()
        .enumerate()
        .map(|(index, id)| (id.clone(), index as i64))
        .collect();
    store.update_order(trip_id, &mapping).await
}

/// Where a tentative ordering gets confirmed.
#[async_trait]
pub trait ReorderSink: Send + Sync {
    async fn persist_order(&self, trip_id: &str, ordered_ids: &[String]) -> Result<(), AppError>;
}

#[async_trait]
impl ReorderSink for LocationStore {
    async fn persist_order(&self, trip_id: &str, ordered_ids: &[String]) -> Result<(), AppError> {
        reorder(self, trip_id, ordered_ids).await
    }
}

/// Client-side view of an itinerary during drag and drop.
///
/// A move first becomes the visible (tentative) order, then is confirmed by the
/// server. If persisting fails the visible order returns to the last confirmed
/// one, so the user never sees an order that is not stored.
#[derive(Debug, Clone)]
pub struct OptimisticItinerary {
    trip_id: String,
    confirmed: Vec<Location>,
    visible: Vec<Location>,
}

impl OptimisticItinerary {
    pub fn new(trip_id: impl Into<String>, mut locations: Vec<Location>) -> Self {
        locations.sort_by_key(|location| location.order);
        Self {
            trip_id: trip_id.into(),
            confirmed: locations.clone(),
            visible: locations,
        }
    }

    pub fn visible(&self) -> &[Location] {
        &self.visible
    }

    pub fn confirmed(&self) -> &[Location] {
        &self.confirmed
    }

    pub fn is_pending(&self) -> bool {
        self.visible != self.confirmed
    }

    pub fn index_of(&self, location_id: &str) -> i64 {
        self.visible
            .iter()
            .position(|location| location.id == location_id)
            .map_or(-1, |index| index as i64)
    }

    /// Applies a move to the visible order and returns the ids to persist.
    pub fn propose(&mut self, from: i64, to: i64) -> Option<Vec<String>> {
        let next = move_item(&self.visible, from, to)?;
        self.visible = next;
        Some(self.visible.iter().map(|l| l.id.clone()).collect())
    }

    pub fn confirm(&mut self) {
        self.confirmed = self.visible.clone();
    }

    pub fn revert(&mut self) {
        self.visible = self.confirmed.clone();
    }

    /// Full two-phase move. `Ok(false)` means the move was a no-op.
    pub async fn drag<S>(&mut self, from: i64, to: i64, sink: &S) -> Result<bool, AppError>
    where
        S: ReorderSink + ?Sized,
    {
        let Some(ordered_ids) = self.propose(from, to) else {
            return Ok(false);
        };

        match sink.persist_order(&self.trip_id, &ordered_ids).await {
            Ok(()) => {
                self.confirm();
                Ok(true)
            }
            Err(err) => {
                warn!("reorder of trip {} failed, reverting: {err}", self.trip_id);
                self.revert();
                Err(err)
            }
        }
    }

    /// Drag expressed the way drop targets report it: by the ids involved.
    pub async fn drag_onto<S>(
        &mut self,
        active_id: &str,
        over_id: &str,
        sink: &S,
    ) -> Result<bool, AppError>
    where
        S: ReorderSink + ?Sized,
    {
        let from = self.index_of(active_id);
        let to = self.index_of(over_id);
        self.drag(from, to, sink).await
    }
}
