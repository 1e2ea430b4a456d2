//! Single-settlement promise primitive.
//!
//! A [`Deferred`] settles exactly once, with a typed response or a
//! [`RequestError`]. Callbacks registered before settlement run in
//! registration order; a callback registered afterwards runs immediately
//! on the registering thread. Re-settling an already settled deferred is
//! a silent no-op, which is what makes the dispatcher's delivery closures
//! safe to call from more than one path.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::RequestError;
use crate::response::Response;
use crate::transport::Connection;

/// Bytes moved so far on one side of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
}

pub type SettleResult<T> = Result<Arc<Response<T>>, Arc<RequestError>>;

type SettleCallback<T> = Box<dyn FnOnce(&SettleResult<T>) + Send>;
type ProgressCallback = Box<dyn FnMut(Progress) + Send>;

enum State<T> {
    Pending {
        on_settle: Vec<SettleCallback<T>>,
        on_upload: Vec<ProgressCallback>,
        on_download: Vec<ProgressCallback>,
    },
    Settled(SettleResult<T>),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    connection: Mutex<Option<Arc<dyn Connection>>>,
}

pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending {
                    on_settle: Vec::new(),
                    on_upload: Vec::new(),
                    on_download: Vec::new(),
                }),
                connection: Mutex::new(None),
            }),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.shared.state.lock().unwrap(), State::Pending { .. })
    }

    pub fn result(&self) -> Option<SettleResult<T>> {
        match &*self.shared.state.lock().unwrap() {
            State::Settled(result) => Some(result.clone()),
            State::Pending { .. } => None,
        }
    }

    /// The transport connection serving this deferred, once dispatched.
    pub fn set_connection(&self, connection: Arc<dyn Connection>) {
        *self.shared.connection.lock().unwrap() = Some(connection);
    }

    pub fn resolve(&self, response: Response<T>) {
        self.settle(Ok(Arc::new(response)));
    }

    pub fn reject(&self, error: RequestError) {
        self.settle(Err(Arc::new(error)));
    }

    /// Cancels the underlying connection, if any, and rejects.
    pub fn abort(&self, error: RequestError) {
        if let Some(connection) = self.shared.connection.lock().unwrap().take() {
            connection.cancel();
        }
        self.reject(error);
    }

    fn settle(&self, result: SettleResult<T>) {
        let callbacks = {
            let mut state = self.shared.state.lock().unwrap();
            match &mut *state {
                State::Settled(_) => {
                    log::debug!("deferred already settled, ignoring");
                    return;
                }
                State::Pending { on_settle, .. } => {
                    let callbacks = std::mem::take(on_settle);
                    *state = State::Settled(result.clone());
                    callbacks
                }
            }
        };
        for callback in callbacks {
            callback(&result);
        }
    }

    pub fn on_settle(&self, callback: impl FnOnce(&SettleResult<T>) + Send + 'static) {
        let mut callback = Some(callback);
        let settled = {
            let mut state = self.shared.state.lock().unwrap();
            match &mut *state {
                State::Pending { on_settle, .. } => {
                    on_settle.push(Box::new(callback.take().unwrap()));
                    None
                }
                State::Settled(result) => Some(result.clone()),
            }
        };
        if let Some(result) = settled {
            (callback.take().unwrap())(&result);
        }
    }

    pub fn on_upload_progress(&self, callback: impl FnMut(Progress) + Send + 'static) {
        if let State::Pending { on_upload, .. } = &mut *self.shared.state.lock().unwrap() {
            on_upload.push(Box::new(callback));
        }
    }

    pub fn on_download_progress(&self, callback: impl FnMut(Progress) + Send + 'static) {
        if let State::Pending { on_download, .. } = &mut *self.shared.state.lock().unwrap() {
            on_download.push(Box::new(callback));
        }
    }

    /// Progress callbacks only fire while pending; notifications after
    /// settlement are dropped. Callbacks must not re-enter this deferred.
    pub fn notify_upload(&self, progress: Progress) {
        if let State::Pending { on_upload, .. } = &mut *self.shared.state.lock().unwrap() {
            for callback in on_upload.iter_mut() {
                callback(progress);
            }
        }
    }

    pub fn notify_download(&self, progress: Progress) {
        if let State::Pending { on_download, .. } = &mut *self.shared.state.lock().unwrap() {
            for callback in on_download.iter_mut() {
                callback(progress);
            }
        }
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// Blocks until settlement or the timeout elapses.
    pub fn wait(&self, timeout: Duration) -> Option<SettleResult<T>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.on_settle(move |result| {
            let _ = tx.try_send(result.clone());
        });
        rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::header::Headers;
    use crate::http::{Method, Status};

    fn response(body: &str) -> Response<String> {
        Response::new(Status::OK, Headers::new(), body.to_owned())
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let deferred = Deferred::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            deferred.on_settle(move |_| order.lock().unwrap().push(i));
        }
        deferred.resolve(response("x"));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn second_settlement_is_ignored() {
        let deferred = Deferred::new();
        deferred.resolve(response("first"));
        deferred.reject(RequestError::new(Method::Get, "u", ErrorKind::Network("late".into())));
        let result = deferred.result().unwrap();
        assert_eq!(result.unwrap().body(), "first");
    }

    #[test]
    fn late_registration_fires_immediately() {
        let deferred = Deferred::new();
        deferred.resolve(response("done"));
        let fired = Arc::new(Mutex::new(false));
        let flag = fired.clone();
        deferred.on_settle(move |result| {
            assert!(result.is_ok());
            *flag.lock().unwrap() = true;
        });
        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn progress_stops_after_settlement() {
        let deferred: Deferred<String> = Deferred::new();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        deferred.on_download_progress(move |_| *counter.lock().unwrap() += 1);
        deferred.notify_download(Progress { loaded: 1, total: None });
        deferred.resolve(response("x"));
        deferred.notify_download(Progress { loaded: 2, total: None });
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn wait_returns_settlement() {
        let deferred = Deferred::new();
        let remote = deferred.clone();
        std::thread::spawn(move || remote.resolve(response("later")));
        let result = deferred.wait(Duration::from_secs(2)).unwrap();
        assert_eq!(result.unwrap().body(), "later");
    }

    #[test]
    fn wait_times_out_while_pending() {
        let deferred: Deferred<String> = Deferred::new();
        assert!(deferred.wait(Duration::from_millis(20)).is_none());
        assert!(deferred.is_pending());
    }
}
