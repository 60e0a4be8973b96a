use std::{
    any::Any,
    fmt::Display,
    future::Future,
    io,
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Context as _;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyModifiers};

use futures::StreamExt;
use tokio::runtime::Runtime;

use tui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};

use geojson::{feature::Id, Feature, GeoJson, Value};

use overmap::{
    map::MapView,
    overlay::{self, FeatureStats},
    render,
    util::{DotsSpinner, WrappingList},
    SearchMode,
};

/// Overlay slot that search results are rendered into.
const SEARCH_OVERLAY: &str = "search-results";

const SCREENSHOT_PATH: &str = "screenshot.svg";

trait ParamValue: Display + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn cloned(&self) -> Box<dyn ParamValue>;
    fn from_str(&mut self, s: &str) -> bool;
}

impl<E, T: Clone + Display + Send + Sync + FromStr<Err = E> + 'static> ParamValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn cloned(&self) -> Box<dyn ParamValue> {
        Box::new(self.clone())
    }

    fn from_str(&mut self, s: &str) -> bool {
        match s.parse() {
            Ok(r) => {
                *self = r;
                true
            }
            Err(_) => false,
        }
    }
}

struct State {
    focus: WidgetId,
    query: String,
    stats: FeatureStats,
    labels: WrappingList<String>,
    map: MapView,
    params: WrappingList<(&'static str, Box<dyn ParamValue>)>,
    worker_state: WorkerState,
    fetching_spinner: DotsSpinner,
    parm_edit_state: Option<ParmEditState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WidgetId {
    Results,
    Search,
    Options,
    Help,
    Error,
    ParamEdit,
}

enum WorkerState {
    Idle,
    Fetching,
    Error(anyhow::Error),
}

struct ParmEditState {
    buffer: String,
    value: Box<dyn ParamValue>,
    is_valid: bool,
}

impl ParmEditState {
    fn new(mut value: Box<dyn ParamValue>) -> Self {
        let buffer = value.to_string();
        let is_valid = value.from_str(&buffer);
        ParmEditState {
            buffer,
            value,
            is_valid,
        }
    }
}

impl State {
    const MODE_OPTION: &'static str = "Search mode";
    const WIDTH_OPTION: &'static str = "Width";
    const HEIGHT_OPTION: &'static str = "Height";
    const BACKGROUND_COLOR: &'static str = "Background color";
    const OPEN_OPTION: &'static str = "Open on export";

    fn new() -> Self {
        State {
            focus: WidgetId::Search,
            query: String::new(),
            stats: FeatureStats::default(),
            labels: WrappingList::new(vec![]),
            map: MapView::new(),
            params: WrappingList::new(vec![
                (Self::MODE_OPTION, Box::new(SearchMode::Natural)),
                (Self::WIDTH_OPTION, Box::new(1920.0)),
                (Self::HEIGHT_OPTION, Box::new(1080.0)),
                (Self::BACKGROUND_COLOR, Box::new("none".to_string())),
                (Self::OPEN_OPTION, Box::new(true)),
            ]),
            worker_state: WorkerState::Idle,
            fetching_spinner: DotsSpinner::new(),
            parm_edit_state: None,
        }
    }

    fn max_option_key_len(&self) -> usize {
        self.params
            .iter()
            .map(|(k, _)| k.len())
            .max()
            .unwrap_or_default()
    }

    fn param<T: Any>(&self, key: &str) -> &T {
        for (k, v) in self.params.iter() {
            if k != &key {
                continue;
            }

            return v.as_any().downcast_ref::<T>().expect("invalid param type");
        }

        panic!("parameter {} not found", key)
    }

    fn set_current_param(&mut self, value: Box<dyn ParamValue>) {
        if let Some((_, v)) = self.params.selected_mut() {
            *v = value;
        }
    }

    /// Renders a freshly fetched collection into the search overlay.
    ///
    /// Fetches are not sequenced: if two are in flight, whichever completes
    /// last wins and overwrites the overlay.
    fn apply_results(&mut self, geojson: GeoJson) -> anyhow::Result<()> {
        if !self.map.is_ready() {
            log::warn!("map is not ready yet, dropping search results");
            return Ok(());
        }

        overlay::set_overlay(&mut self.map, SEARCH_OVERLAY, &geojson)?;
        self.stats = overlay::feature_stats(Some(&geojson));
        self.labels.replace(feature_labels(&geojson));
        self.focus = WidgetId::Results;
        Ok(())
    }

    fn fetch<T: Send + 'static>(
        &mut self,
        state: Arc<Mutex<Self>>,
        fut: impl Future<Output = anyhow::Result<T>> + Send + 'static,
        mut on_success: impl FnMut(&mut Self, T) -> anyhow::Result<()> + Send + 'static,
    ) {
        self.worker_state = WorkerState::Fetching;
        self.fetching_spinner = DotsSpinner::new();

        let _complete = tokio::task::spawn(async move {
            let err = |st: &mut State, e| {
                st.worker_state = WorkerState::Error(e);
                st.focus = WidgetId::Error;
                st.fetching_spinner = DotsSpinner::new();
            };

            match fut.await {
                Ok(d) => {
                    let mut state = state.lock().unwrap();
                    state.worker_state = WorkerState::Idle;
                    if let Err(e) = on_success(&mut state, d) {
                        err(&mut state, e);
                    }
                }
                Err(e) => {
                    // upstream failures are logged and swallowed; the only
                    // visible effect is the absence of new results
                    log::warn!("search failed: {e:#}");
                    let mut state = state.lock().unwrap();
                    state.worker_state = WorkerState::Idle;
                    state.fetching_spinner = DotsSpinner::new();
                }
            }
        });
    }
}

fn geometry_label(feature: &Feature) -> &'static str {
    match feature.geometry.as_ref().map(|g| &g.value) {
        Some(Value::Point(_)) => "point",
        Some(Value::MultiPoint(_)) => "points",
        Some(Value::LineString(_)) => "line",
        Some(Value::MultiLineString(_)) => "lines",
        Some(Value::Polygon(_)) => "polygon",
        Some(Value::MultiPolygon(_)) => "polygons",
        Some(Value::GeometryCollection(_)) => "collection",
        None => "empty",
    }
}

fn feature_labels(geojson: &GeoJson) -> Vec<String> {
    let fc = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Vec::new(),
    };

    fc.features
        .iter()
        .map(|feature| {
            let name = feature
                .property("name")
                .or_else(|| feature.property("display_name"))
                .and_then(|v| v.as_str());

            let id = match &feature.id {
                Some(Id::String(s)) => Some(s.as_str()),
                _ => None,
            };

            format!(
                "{} [{}]",
                name.or(id).unwrap_or("(unnamed)"),
                geometry_label(feature)
            )
        })
        .collect()
}

fn export_screenshot(state: &State) -> anyhow::Result<()> {
    let w = *state.param::<f64>(State::WIDTH_OPTION);
    let h = *state.param::<f64>(State::HEIGHT_OPTION);
    let background = state.param::<String>(State::BACKGROUND_COLOR);

    render::dump_svg(SCREENSHOT_PATH, (w, h), background, &state.map)
        .context("failed to write screenshot")?;

    let open_on_export = *state.param::<bool>(State::OPEN_OPTION);
    if open_on_export && Path::new(SCREENSHOT_PATH).exists() {
        opener::open(SCREENSHOT_PATH)?;
    }

    Ok(())
}

async fn main_loop(terminal: &mut Terminal<impl Backend>) -> anyhow::Result<()> {
    let mut reader = EventStream::new();
    let state = Arc::new(Mutex::new(State::new()));

    // the terminal session is up, the map can take overlays now
    state.lock().unwrap().map.finish_loading();

    loop {
        terminal.draw(|f| {
            let mut state = state.lock().unwrap();
            draw(f, &mut state)
        })?;

        let ev = match tokio::time::timeout(Duration::from_millis(50), reader.next()).await {
            Err(_) => {
                // timeout expired
                continue;
            }
            Ok(ev) => ev,
        };

        let mut st = state.lock().unwrap();
        match ev {
            Some(Ok(event)) => {
                let KeyEvent {
                    code, modifiers, ..
                } = match event {
                    Event::Key(k) => k,
                    _ => continue,
                };

                if st.focus != WidgetId::ParamEdit {
                    if code == KeyCode::Esc
                        || (code, modifiers) == (KeyCode::Char('c'), KeyModifiers::CONTROL)
                    {
                        break;
                    }

                    if code == KeyCode::Tab || code == KeyCode::BackTab {
                        let tab_order = [
                            WidgetId::Search,
                            WidgetId::Results,
                            WidgetId::Options,
                            WidgetId::Help,
                        ];
                        let current = tab_order.iter().position(|w| w == &st.focus).unwrap();
                        let next = current
                            + if code == KeyCode::Tab {
                                1
                            } else {
                                tab_order.len() - 1
                            };

                        st.focus = tab_order[next % tab_order.len()];
                        continue;
                    }
                }

                handle_key_event(code, &mut st, &state).await?;
            }
            Some(Err(_)) | None => break,
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    crossterm::terminal::enable_raw_mode()?;

    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    terminal.clear()?;

    let runtime = Runtime::new()?;
    let _ = runtime.block_on(main_loop(&mut terminal));

    terminal.clear()?;
    crossterm::terminal::disable_raw_mode()?;

    Ok(())
}

fn draw(f: &mut Frame<impl Backend>, state: &mut State) {
    use tui::{
        layout::{Constraint, Direction, Layout},
        style::{Color, Modifier, Style},
        widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    };

    let focus = state.focus;
    let block = |widget, title| {
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(if focus == widget {
                Style::default().fg(Color::LightYellow)
            } else {
                Style::default()
            })
    };

    let list = |widget, title, symbol, items| {
        List::new(items)
            .block(block(widget, title))
            .highlight_symbol(symbol)
            .highlight_style(
                Style::default()
                    .fg(Color::LightYellow)
                    .add_modifier(Modifier::ITALIC | Modifier::DIM),
            )
    };

    let worker_busy = {
        match state.worker_state {
            WorkerState::Idle => false,
            WorkerState::Fetching => {
                state.fetching_spinner.tick();
                true
            }
            WorkerState::Error(ref e) => {
                let error = Paragraph::new(format!("{e:#}\n\nHit <Enter> to continue."))
                    .block(block(WidgetId::Error, "Error"))
                    .wrap(Wrap { trim: true });
                f.render_widget(error, f.size());
                return;
            }
        }
    };

    let hchunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(f.size());

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(hchunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(hchunks[1]);

    let query_input = Paragraph::new(state.query.as_ref())
        .block(block(WidgetId::Search, "Search"))
        .wrap(Wrap { trim: true });

    let stats = state.stats;
    let stats_line = Paragraph::new(format!(
        "{} features: {} points, {} lines, {} polygons, {} geometry collections",
        stats.features, stats.points, stats.lines, stats.polygons, stats.geometry_collections,
    ))
    .block(Block::default().title("Features").borders(Borders::ALL));

    let symbol = if worker_busy {
        state.fetching_spinner.pattern().to_string() + " "
    } else {
        "> ".to_string()
    };

    let results = list(
        WidgetId::Results,
        "Results",
        &symbol,
        state
            .labels
            .iter()
            .map(|label| ListItem::new(label.clone()))
            .collect::<Vec<_>>(),
    );

    let max_option_key_len = state.max_option_key_len();
    let options = list(
        WidgetId::Options,
        "Options",
        "* ",
        state
            .params
            .iter()
            .map(|(k, v)| {
                let mut s = k.to_string();
                s += ": ";
                for _ in 0..max_option_key_len - k.len() {
                    s.push(' ');
                }
                s += &v.to_string();

                ListItem::new(s)
            })
            .collect(),
    );

    let help = Paragraph::new(
        r#"Search OpenStreetMap and render the matches as map overlays.

Type a query and hit <Enter>. The "Search mode" option picks how the query is read: "place" geocodes a place name, "overpass" runs a raw Overpass QL query, "natural" asks a language model to write the Overpass QL for you (needs OPENAI_API_KEY).

Use the arrow keys or jk to move up and down and <TAB> to switch section.

Hit <Enter> on an option to edit it.

Hit e (outside the search box) to export the map as screenshot.svg.

Esc or Ctrl-C to quit.
"#,
    )
    .block(block(WidgetId::Help, "Help"))
    .wrap(Wrap { trim: true });

    f.render_widget(query_input, left_chunks[0]);
    f.render_widget(stats_line, left_chunks[1]);
    f.render_stateful_widget(results, left_chunks[2], &mut state.labels.state());

    if state.focus == WidgetId::Options {
        f.render_stateful_widget(options, right_chunks[0], &mut state.params.state());
    } else {
        f.render_widget(options, right_chunks[0]);
    }
    f.render_widget(help, right_chunks[1]);

    if state.focus == WidgetId::ParamEdit {
        let edit_state = state.parm_edit_state.as_ref().unwrap();

        if let Some((param, _)) = state.params.selected() {
            let parm_edit = Paragraph::new(edit_state.buffer.as_ref())
                .block(block(WidgetId::ParamEdit, param))
                .wrap(Wrap { trim: true })
                .style(if edit_state.is_valid {
                    Style::default()
                } else {
                    Style::default().bg(Color::LightRed)
                });

            let hcentered = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Percentage(30),
                    Constraint::Percentage(40),
                    Constraint::Percentage(30),
                ])
                .split(f.size());
            let vcentered = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Percentage(30),
                    Constraint::Max(3),
                    Constraint::Percentage(30),
                ])
                .split(hcentered[1]);

            f.render_widget(Clear, vcentered[1]);
            f.render_widget(parm_edit, vcentered[1]);
        }
    }
}

async fn handle_key_event(
    code: KeyCode,
    state: &mut State,
    state_m: &Arc<Mutex<State>>,
) -> anyhow::Result<()> {
    // note: no busy gate here. A second search may be fired while one is in
    // flight; whichever response lands last overwrites the overlay.

    if code == KeyCode::Char('e')
        && matches!(
            state.focus,
            WidgetId::Results | WidgetId::Options | WidgetId::Help
        )
    {
        if let Err(e) = export_screenshot(state) {
            state.worker_state = WorkerState::Error(e);
            state.focus = WidgetId::Error;
        }
        return Ok(());
    }

    match state.focus {
        WidgetId::Search => match code {
            KeyCode::Enter => {
                if !state.query.is_empty() {
                    let query = state.query.clone();
                    let mode = *state.param::<SearchMode>(State::MODE_OPTION);

                    state.fetch(
                        Arc::clone(state_m),
                        async move { overmap::search(mode, &query).await },
                        |state, geojson| state.apply_results(geojson),
                    );
                }
            }
            code => {
                edit_string(&mut state.query, code);
            }
        },
        WidgetId::Results => match code {
            KeyCode::Up | KeyCode::Char('k') => {
                state.labels.up();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                state.labels.down();
            }
            _ => {}
        },
        WidgetId::Options => match code {
            KeyCode::Up | KeyCode::Char('k') => {
                state.params.up();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                state.params.down();
            }
            KeyCode::Enter => {
                if let Some((_param, value)) = state.params.selected() {
                    state.parm_edit_state = Some(ParmEditState::new(value.cloned()));
                    state.focus = WidgetId::ParamEdit;
                }
            }
            _ => {}
        },
        WidgetId::ParamEdit => match code {
            KeyCode::Enter => {
                if state.parm_edit_state.as_ref().unwrap().is_valid {
                    let mut edit_state = None;
                    std::mem::swap(&mut edit_state, &mut state.parm_edit_state);

                    state.set_current_param(edit_state.unwrap().value);
                    state.focus = WidgetId::Options;
                }
            }
            KeyCode::Esc => {
                state.parm_edit_state = None;
                state.focus = WidgetId::Options;
            }
            _ => {
                let edit_state = state.parm_edit_state.as_mut().unwrap();
                edit_string(&mut edit_state.buffer, code);

                edit_state.is_valid = edit_state.value.from_str(&edit_state.buffer);
            }
        },
        WidgetId::Help => {}
        WidgetId::Error => {
            if code == KeyCode::Enter {
                state.worker_state = WorkerState::Idle;
                state.focus = WidgetId::Search;
            }
        }
    }

    Ok(())
}

fn edit_string(s: &mut String, code: KeyCode) {
    match code {
        KeyCode::Backspace => {
            s.pop();
        }
        KeyCode::Char(c) => {
            s.push(c);
        }
        _ => {}
    }
}
