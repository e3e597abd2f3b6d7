//! Dispatch of verified events to their handlers.

use dropline_core::{PaymentEvent, ReceivedEvent};
use tracing::instrument;

use crate::pipeline::{CheckoutPipeline, CheckoutReport};

/// What routing did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The checkout pipeline ran.
    Fulfilled(Box<CheckoutReport>),
    /// A successful payment intent was logged.
    PaymentLogged,
    /// The event type is not handled.
    Ignored,
}

/// Route one verified event. Never fails: handler errors live in the report.
#[instrument(skip_all, fields(event_id = %received.id, kind = received.event.kind()))]
pub async fn route_event(pipeline: &CheckoutPipeline, received: ReceivedEvent) -> RouteOutcome {
    match received.event {
        PaymentEvent::CheckoutCompleted(session) => {
            let report = pipeline.handle(&session).await;
            tracing::info!(
                order_number = report.order_number.as_ref().map(ToString::to_string),
                duplicate = report.is_duplicate(),
                marked_paid = report.marked_paid,
                "Checkout processed"
            );
            RouteOutcome::Fulfilled(Box::new(report))
        }
        PaymentEvent::PaymentSucceeded(intent) => {
            tracing::info!(
                payment_intent = %intent.id,
                amount = %intent.amount,
                "Payment intent succeeded"
            );
            RouteOutcome::PaymentLogged
        }
        PaymentEvent::Unknown { event_type } => {
            tracing::debug!(event_type, "Ignoring unhandled event type");
            RouteOutcome::Ignored
        }
    }
}
