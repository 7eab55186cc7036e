use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;

use crate::request::{OnFailure, OnSuccess, Payload, Request, RequestClient, SendOutcome};
use crate::{Endpoints, FailureKind, FetchError, ServerOp};

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(rename = "inProgress")]
    in_progress: bool,
}

/// The site's three POST operations on top of a [`RequestClient`].
#[derive(Clone)]
pub struct ServerApi {
    client: RequestClient,
    endpoints: Endpoints,
}

impl ServerApi {
    pub fn new(client: RequestClient, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    /// `done` receives whether a fulfillment is already in progress.
    pub fn check_status<F>(&self, done: F) -> SendOutcome
    where
        F: FnOnce(Result<bool, FetchError>) + Send + 'static,
    {
        self.send(ServerOp::CheckFulfillmentStatus, Payload::empty(), done, |body| {
            serde_json::from_str::<StatusBody>(&body)
                .map(|status| status.in_progress)
                .map_err(|err| FetchError::new(FailureKind::InvalidResponse, err.to_string()))
        })
    }

    pub fn reserve<F>(&self, item_id: &str, done: F) -> SendOutcome
    where
        F: FnOnce(Result<(), FetchError>) + Send + 'static,
    {
        self.send(ServerOp::ReserveItem, Payload::field("id", item_id), done, |_| Ok(()))
    }

    /// Sent under the leaving key: repeats while one is in flight are dropped.
    pub fn start_fulfillment<F>(&self, done: F) -> SendOutcome
    where
        F: FnOnce(Result<(), FetchError>) + Send + 'static,
    {
        self.send(ServerOp::StartFulfillment, Payload::empty(), done, |_| Ok(()))
    }

    fn send<T, F>(
        &self,
        op: ServerOp,
        payload: Payload,
        done: F,
        parse: fn(String) -> Result<T, FetchError>,
    ) -> SendOutcome
    where
        T: 'static,
        F: FnOnce(Result<T, FetchError>) + Send + 'static,
    {
        let request = Request::new(op.key(), self.endpoints.path(op), payload);
        let (on_success, on_failure) = split_completion(done, parse);
        self.client.send(request, on_success, Some(on_failure))
    }
}

/// Fans one completion out to the success and failure callbacks; whichever
/// runs first takes it.
fn split_completion<T, F>(
    done: F,
    parse: fn(String) -> Result<T, FetchError>,
) -> (OnSuccess, OnFailure)
where
    T: 'static,
    F: FnOnce(Result<T, FetchError>) + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some(done)));
    let failure_slot = Arc::clone(&slot);
    let take = |slot: &Mutex<Option<F>>| slot.lock().unwrap_or_else(PoisonError::into_inner).take();

    let on_success: OnSuccess = Box::new(move |body| {
        if let Some(done) = take(&slot) {
            done(parse(body));
        }
    });
    let on_failure: OnFailure = Box::new(move |failure| {
        if let Some(done) = take(&failure_slot) {
            done(Err(failure));
        }
    });
    (on_success, on_failure)
}
