//! Ride service - drivers offering rides and viewing who booked them.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::booking::Booking;
use crate::models::ride::{CreateRideRequest, MAX_SEATS_PER_RIDE, NewRide, Ride};
use crate::state::AppState;

/// Offer a new ride owned by `actor`.
///
/// # Errors
///
/// - `InvalidSeatCount`: total seats outside `1..=50`
/// - `InvalidRequest`: price is zero or negative
pub async fn create_ride(
    state: &AppState,
    actor: &Actor,
    request: CreateRideRequest,
) -> Result<Ride, AppError> {
    if !(1..=MAX_SEATS_PER_RIDE).contains(&request.total_seats) {
        return Err(AppError::InvalidSeatCount(request.total_seats));
    }
    if request.price_per_seat_paise <= 0 {
        return Err(AppError::InvalidRequest(
            "Price per seat must be positive".to_string(),
        ));
    }

    let ride = state
        .store
        .insert_ride(NewRide {
            owner_id: actor.user_id,
            total_seats: request.total_seats,
            price_per_seat_paise: request.price_per_seat_paise,
        })
        .await?;

    tracing::info!(
        ride_id = %ride.id,
        owner_id = %ride.owner_id,
        seats = ride.total_seats,
        "ride offered"
    );
    Ok(ride)
}

pub async fn get_ride(state: &AppState, ride_id: Uuid) -> Result<Ride, AppError> {
    state
        .store
        .find_ride(ride_id)
        .await?
        .ok_or(AppError::RideNotFound)
}

/// Bookings of a ride, visible to its owner and to operators.
pub async fn list_ride_bookings(
    state: &AppState,
    actor: &Actor,
    ride_id: Uuid,
) -> Result<Vec<Booking>, AppError> {
    let ride = get_ride(state, ride_id).await?;
    if ride.owner_id != actor.user_id && !actor.is_operator() {
        return Err(AppError::Forbidden(
            "only the ride owner can list its bookings".to_string(),
        ));
    }
    state.store.list_ride_bookings(ride_id).await
}
