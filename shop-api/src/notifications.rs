use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use shop_core::Caller;
use shop_shared::Notification;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::state::AppState;

/// GET /v1/notifications/stream
/// Live order notifications. Plain users only see their own.
pub async fn stream(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.live.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(notification) if visible_to(&caller, &notification) => to_event(&notification).map(Ok),
        Ok(_) => None,
        Err(e) => {
            // subscriber fell behind; skip what was lost
            tracing::warn!("Notification stream lagged: {}", e);
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn visible_to(caller: &Caller, notification: &Notification) -> bool {
    caller.is_privileged() || notification.user_id() == caller.user_id
}

fn to_event(notification: &Notification) -> Option<Event> {
    match Event::default().event(notification.kind()).json_data(notification) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::error!("Failed to encode {} notification: {}", notification.kind(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shop_shared::models::events::OrderPaidEvent;
    use uuid::Uuid;

    fn paid_by(user_id: Uuid) -> Notification {
        Notification::OrderPaid(OrderPaidEvent {
            order_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            user_id,
            sum: 5,
            timestamp: 0,
        })
    }

    #[test]
    fn test_visibility() {
        let owner = Uuid::new_v4();
        let notification = paid_by(owner);

        assert!(visible_to(&Caller::user(owner), &notification));
        assert!(!visible_to(&Caller::user(Uuid::new_v4()), &notification));
        assert!(visible_to(&Caller::admin(Uuid::new_v4()), &notification));
    }

    #[test]
    fn test_event_encodes() {
        assert!(to_event(&paid_by(Uuid::new_v4())).is_some());
    }
}
