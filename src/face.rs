//! Web front-end: start runs, watch their status over SSE, stop them.

use anyhow::{Result, anyhow};
use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{WebAgent, join_run};
use crate::capability::{Browser, Reasoner};
use crate::handle::RunHandle;
use crate::status::{Activity, StatusEntry, StatusObserver};
use crate::types::{RunRequest, RunResult};

/// How long a finished run stays readable before it is dropped.
pub const RUN_RETENTION: Duration = Duration::from_secs(600);

type Outcome = Option<Result<RunResult, String>>;
type ApiError = (StatusCode, &'static str);

/// One run started through the web UI.
#[derive(Clone)]
struct RunSlot {
    handle: RunHandle,
    wakeups: broadcast::Sender<()>,
    outcome: watch::Receiver<Outcome>,
}

pub struct AppState<B, R> {
    agent: Arc<WebAgent<B, R>>,
    runs: RwLock<HashMap<Uuid, RunSlot>>,
    retention: Duration,
}

pub fn router<B, R>(agent: Arc<WebAgent<B, R>>, retention: Duration) -> Router
where
    B: Browser + 'static,
    R: Reasoner + 'static,
{
    let state = Arc::new(AppState {
        agent,
        runs: RwLock::new(HashMap::new()),
        retention,
    });

    Router::new()
        .route("/", get(index_handler))
        .route("/runs", post(start_handler::<B, R>))
        .route("/runs/{id}", get(run_handler::<B, R>))
        .route("/runs/{id}/history", get(history_handler::<B, R>))
        .route("/runs/{id}/stop", post(stop_handler::<B, R>))
        .route("/runs/{id}/events", get(sse_handler::<B, R>))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state)
}

/// Serve the UI on the first free port in 3000..3010.
pub async fn serve<B, R>(agent: Arc<WebAgent<B, R>>) -> Result<()>
where
    B: Browser + 'static,
    R: Reasoner + 'static,
{
    let app = router(agent, RUN_RETENTION);

    let mut bound = None;
    for port in 3000..3010 {
        if let Ok(listener) = tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            bound = Some((listener, port));
            break;
        }
    }
    let (listener, port) =
        bound.ok_or_else(|| anyhow!("could not bind to any port 3000-3009"))?;

    info!("Web UI running at http://localhost:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn start_handler<B, R>(
    State(state): State<Arc<AppState<B, R>>>,
    Json(request): Json<RunRequest>,
) -> Result<Json<Value>, ApiError>
where
    B: Browser + 'static,
    R: Reasoner + 'static,
{
    if request.goal.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "goal is required"));
    }
    info!(goal = %request.goal, "starting run from web UI");

    // Entries live in the handle's history; the channel only says "look again".
    let (wakeups, _) = broadcast::channel::<()>(16);
    let sender = wakeups.clone();
    let observer: StatusObserver = Arc::new(move |_: &StatusEntry| {
        let _ = sender.send(());
    });
    let (outcome_tx, outcome) = watch::channel::<Outcome>(None);

    let (handle, task) = state.agent.spawn(request, Some(observer));
    let id = handle.id();
    state.runs.write().await.insert(
        id,
        RunSlot {
            handle,
            wakeups,
            outcome,
        },
    );

    let runs = state.clone();
    tokio::spawn(async move {
        let result = join_run(task).await.map_err(|e| {
            warn!(run = %id, error = %e, "run failed");
            e.to_string()
        });
        outcome_tx.send_replace(Some(result));

        tokio::time::sleep(runs.retention).await;
        runs.runs.write().await.remove(&id);
        debug!(run = %id, "finished run evicted");
    });

    Ok(Json(json!({ "id": id })))
}

async fn find<B, R>(state: &AppState<B, R>, id: Uuid) -> Result<RunSlot, ApiError> {
    state
        .runs
        .read()
        .await
        .get(&id)
        .cloned()
        .ok_or((StatusCode::NOT_FOUND, "run not found"))
}

async fn run_handler<B, R>(
    State(state): State<Arc<AppState<B, R>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let slot = find(&state, id).await?;
    let status = slot.handle.current_status();
    let body = match &*slot.outcome.borrow() {
        None => json!({ "id": id, "done": false, "status": status }),
        Some(Ok(result)) => json!({ "id": id, "done": true, "status": status, "result": result }),
        Some(Err(error)) => json!({ "id": id, "done": true, "status": status, "error": error }),
    };
    Ok(Json(body))
}

async fn history_handler<B, R>(
    State(state): State<Arc<AppState<B, R>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusEntry>>, ApiError> {
    Ok(Json(find(&state, id).await?.handle.history()))
}

async fn stop_handler<B, R>(
    State(state): State<Arc<AppState<B, R>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    find(&state, id).await?.handle.stop();
    Ok(Json(json!({ "id": id, "stopping": true })))
}

/// Replays the run's history, then follows it live. The stream ends after
/// `idle`, which is only sent once the run's outcome is readable.
async fn sse_handler<B, R>(
    State(state): State<Arc<AppState<B, R>>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let slot = find(&state, id).await?;
    let (tx, rx) = mpsc::channel::<StatusEntry>(64);
    tokio::spawn(follow(slot, tx));

    let stream = ReceiverStream::new(rx).filter_map(|entry| {
        Event::default()
            .event("status")
            .json_data(&entry)
            .ok()
            .map(Ok::<_, Infallible>)
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn follow(mut slot: RunSlot, tx: mpsc::Sender<StatusEntry>) {
    // Subscribe before reading history so nothing lands in between unseen.
    let mut wakeups = slot.wakeups.subscribe();
    let mut sent = 0;
    loop {
        let fresh: Vec<StatusEntry> = slot.handle.history().into_iter().skip(sent).collect();
        sent += fresh.len();
        for entry in fresh {
            let last = entry.action == Activity::Idle.as_str();
            if last {
                let _ = slot.outcome.wait_for(Option::is_some).await;
            }
            if tx.send(entry).await.is_err() || last {
                return;
            }
        }
        match wakeups.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Web Agent</title>
<style>
  body { background: #0a0a0f; color: #e0e0e0; font-family: system-ui, sans-serif; max-width: 800px; margin: 0 auto; padding: 24px; }
  #log { display: flex; flex-direction: column; gap: 6px; margin: 16px 0; }
  .entry { padding: 8px 12px; border-radius: 6px; background: #111118; border-left: 3px solid #3b82f6; font-size: 14px; }
  .entry.error { border-color: #ef4444; color: #fca5a5; }
  .entry.done { border-color: #22c55e; color: #86efac; }
  input { width: 60%; padding: 10px; background: #111118; color: #fff; border: 1px solid #222; border-radius: 6px; }
  button { padding: 10px 18px; border: none; border-radius: 6px; background: #6366f1; color: #fff; cursor: pointer; }
  button:disabled { background: #333; }
</style>
</head>
<body>
  <h1>Web Agent</h1>
  <input id="goal" placeholder="Tell the agent what to do..." autofocus />
  <button id="start" onclick="start()">Start</button>
  <button id="stop" onclick="stop()" disabled>Stop</button>
  <div id="log"></div>
<script>
  let runId = null;
  const log = document.getElementById('log');
  const esc = s => (s || '').replace(/</g, '&lt;');

  function add(cls, text) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = text;
    log.appendChild(div);
  }

  function setBusy(busy) {
    document.getElementById('start').disabled = busy;
    document.getElementById('stop').disabled = !busy;
  }

  async function start() {
    const goal = document.getElementById('goal').value.trim();
    if (!goal) return;
    log.innerHTML = '';
    setBusy(true);
    const resp = await fetch('/runs', {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify({goal}),
    });
    runId = (await resp.json()).id;
    const es = new EventSource('/runs/' + runId + '/events');
    es.addEventListener('status', async e => {
      const s = JSON.parse(e.data);
      add(s.action === 'error' ? 'error' : '', '<strong>' + esc(s.action) + '</strong> ' + esc(s.details));
      if (s.action === 'idle') {
        es.close();
        const run = await (await fetch('/runs/' + runId)).json();
        add(run.error ? 'error' : 'done', esc(JSON.stringify(run.result ? run.result.result : run.error)));
        setBusy(false);
      }
    });
  }

  async function stop() {
    if (runId) await fetch('/runs/' + runId + '/stop', {method: 'POST'});
  }
</script>
</body>
</html>
"##;
