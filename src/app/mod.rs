pub mod confirm;
pub mod errorlog;
pub mod events;
pub mod executor;
pub mod keymap;
pub mod navigation;
pub mod rebase;
pub mod state;
pub mod ui;
pub mod update;
pub mod widgets;

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event as TermEvent, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::Config;
use crate::models::{Instance, InstanceId, InstanceStatus};
use crate::session::{
    fetch_pull_request, GitWorktree, InstanceStorage, TmuxSession, WorktreeService,
};
use crate::utils::{sanitize_branch_name, truncate_str};

use confirm::{ConfirmAction, ConfirmationGate, GateKey, Verdict};
use errorlog::ErrorLog;
use events::{AsyncResult, Event, TimerId};
use executor::{AsyncCommand, CommandExecutor};
use keymap::{KeyAction, Keymap};
use navigation::{build_navigation_views, ChangeCounter, DiffNavigator, NavigationView};
use rebase::{RebaseSession, RebaseTracker};
use state::{
    AppState, BranchPickerOverlay, CommentOverlay, DeferredAction, HelpOverlay,
    KeybindingsOverlay, NameOverlay, PrOverlay, PromptOverlay,
};
use update::{UpdateChecker, UpdateStatus};
use widgets::{HelpKind, ListPicker, TextInput};

const MESSAGE_TTL: Duration = Duration::from_secs(3);

/// How long a recognized key highlights its footer hint.
const FLASH_TTL: Duration = Duration::from_millis(200);

/// Delay before a startup prompt is sent, so the agent's REPL is up.
const PROMPT_STARTUP_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Preview,
    Diff,
}

/// The controller. Owns all mutable core state and is the only task that
/// touches it; everything slow happens in scheduled async commands whose
/// single result event re-enters the queue.
pub struct App {
    config: Config,
    config_path: PathBuf,
    keymap: Keymap,
    worktrees: WorktreeService,
    storage: InstanceStorage,
    executor: CommandExecutor,
    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
    update: UpdateChecker,
    update_status: UpdateStatus,

    instances: Vec<Instance>,
    selected: usize,
    next_id: InstanceId,

    state: AppState,
    gate: ConfirmationGate,
    rebase: RebaseTracker,
    errors: ErrorLog,
    navigator: DiffNavigator,

    active_tab: Tab,
    preview_text: String,
    message: Option<String>,
    message_seq: u64,
    /// Footer hint currently highlighted because its key was pressed.
    flash: Option<KeyAction>,
    flash_seq: u64,
    branch_fetch_seq: u64,
    pr_fetch_seq: u64,
    help_seen: HashSet<String>,

    /// Drawing paused while the terminal belongs to an attached tmux client.
    suspended: bool,
    needs_clear: bool,
    should_quit: bool,
}

impl App {
    pub async fn new(config: Config, project_path: PathBuf) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let keymap = Keymap::with_overrides(&config.keybindings)?;
        let worktrees = WorktreeService::resolve(project_path).await?;
        let storage = InstanceStorage::new(InstanceStorage::default_dir());

        let instances = storage.load_instances().await;
        let next_id = instances.iter().map(|i| i.id).max().map_or(1, |m| m + 1);

        let mut help_seen = HashSet::new();
        for kind in [HelpKind::FirstInstance, HelpKind::FirstPrompt] {
            if storage.help_seen(kind.storage_key()).await {
                help_seen.insert(kind.storage_key().to_string());
            }
        }

        let update = UpdateChecker::new();
        update.spawn_probe(
            worktrees.git_root().to_path_buf(),
            Duration::from_secs(config.update_check_secs),
        );

        Ok(Self {
            executor: CommandExecutor::new(events_tx.clone()),
            keymap,
            worktrees,
            storage,
            events_tx,
            events_rx,
            update,
            update_status: UpdateStatus::default(),
            instances,
            selected: 0,
            next_id,
            state: AppState::Default,
            gate: ConfirmationGate::new(),
            rebase: RebaseTracker::new(),
            errors: ErrorLog::new(),
            navigator: DiffNavigator::new(),
            active_tab: Tab::Preview,
            preview_text: String::new(),
            message: None,
            message_seq: 0,
            flash: None,
            flash_seq: 0,
            branch_fetch_seq: 0,
            pr_fetch_seq: 0,
            help_seen,
            suspended: false,
            needs_clear: false,
            should_quit: false,
            config,
            config_path: Config::resolved_path(),
        })
    }

    pub async fn run(mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        Self::spawn_input_reader(self.events_tx.clone());
        self.schedule_preview_tick();
        self.schedule_preview_capture();
        self.schedule_navigation_rebuild();

        loop {
            if self.needs_clear {
                terminal.clear()?;
                self.needs_clear = false;
            }
            if !self.suspended {
                terminal.draw(|frame| ui::render(frame, &self))?;
            }

            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            self.handle_event(event);

            if self.should_quit {
                break;
            }
        }
        Ok(())
    }

    /// Terminal input runs on its own thread so `event::read` can block
    /// without stalling the runtime; keys become events on the same queue
    /// every other source feeds.
    fn spawn_input_reader(tx: UnboundedSender<Event>) {
        std::thread::spawn(move || loop {
            let event = match crossterm::event::read() {
                Ok(event) => event,
                Err(_) => break,
            };
            let mapped = match event {
                TermEvent::Key(key) => Event::Key(key),
                TermEvent::Mouse(mouse) => Event::Mouse(mouse),
                TermEvent::Resize(w, h) => Event::Resize(w, h),
                _ => continue,
            };
            if tx.send(mapped).is_err() {
                break;
            }
        });
    }

    // ---- dispatch ----------------------------------------------------

    pub(crate) fn handle_event(&mut self, event: Event) {
        // A decided confirmation runs before anything else. The displaced
        // event is requeued so it is not lost.
        if let Some(verdict) = self.gate.take_verdict() {
            if let Verdict::Accepted(action) = verdict {
                self.execute_confirmed(action);
            }
            let _ = self.events_tx.send(event);
            return;
        }

        self.update_status = self.update.snapshot();

        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Mouse(_) => {}
            Event::Resize(_, _) => {}
            Event::Tick(timer) => self.handle_tick(timer),
            Event::Result(result) => self.handle_result(result),
            Event::Message(message) => self.show_message(message),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }
        // Recognized keys flash their footer hint in every state except
        // while the gate holds the input.
        if !matches!(self.state, AppState::Confirming { .. }) {
            if let Some(action) = self.keymap.action_for(key.code) {
                self.flash_hint(action);
            }
        }
        let state = std::mem::take(&mut self.state);
        self.state = self.key_in_state(state, key.code);
    }

    fn flash_hint(&mut self, action: KeyAction) {
        self.flash = Some(action);
        self.flash_seq += 1;
        let seq = self.flash_seq;
        self.executor.schedule(AsyncCommand::new(async move {
            tokio::time::sleep(FLASH_TTL).await;
            Event::Tick(TimerId::FlashExpiry { seq })
        }));
    }

    fn key_in_state(&mut self, state: AppState, code: KeyCode) -> AppState {
        match state {
            AppState::Default => self.default_key(code),

            AppState::Confirming { prompt } => {
                if self.gate.handle_key(code) == GateKey::Decided {
                    // Overlay comes down now; queue a wake-up so the verdict
                    // runs right away instead of on the next natural event.
                    self.executor
                        .schedule(AsyncCommand::ready(Event::Tick(TimerId::VerdictSweep)));
                    AppState::Default
                } else {
                    AppState::Confirming { prompt }
                }
            }

            AppState::NamingInstance(mut overlay) => match code {
                KeyCode::Esc => AppState::Default,
                KeyCode::Enter => {
                    if overlay.input.is_empty() {
                        // Empty name: nothing happens, the overlay stays.
                        AppState::NamingInstance(overlay)
                    } else if overlay.with_prompt {
                        AppState::Prompting(PromptOverlay {
                            input: TextInput::new(),
                            instance_name: overlay.input.content(),
                        })
                    } else {
                        self.schedule_create_instance(overlay.input.content(), None);
                        AppState::Default
                    }
                }
                code => {
                    edit_input(&mut overlay.input, code);
                    AppState::NamingInstance(overlay)
                }
            },

            AppState::Prompting(mut overlay) => match code {
                KeyCode::Esc => {
                    // Cancel still creates the instance, just without the
                    // startup prompt.
                    self.schedule_create_instance(overlay.instance_name, None);
                    AppState::Default
                }
                KeyCode::Enter => {
                    let prompt = overlay.input.content();
                    let prompt = (!overlay.input.is_empty()).then_some(prompt);
                    self.schedule_create_instance(overlay.instance_name, prompt);
                    AppState::Default
                }
                code => {
                    edit_input(&mut overlay.input, code);
                    AppState::Prompting(overlay)
                }
            },

            AppState::Help(overlay) => {
                let key = overlay.kind.storage_key().to_string();
                if !self.help_seen.contains(&key) {
                    self.help_seen.insert(key.clone());
                    self.schedule_mark_help_seen(key);
                }
                match overlay.then {
                    Some(DeferredAction::OpenNaming { with_prompt }) => {
                        AppState::NamingInstance(NameOverlay {
                            input: TextInput::new(),
                            with_prompt,
                        })
                    }
                    None => AppState::Default,
                }
            }

            AppState::SelectingBranch(mut overlay) => match code {
                KeyCode::Esc => AppState::Default,
                KeyCode::Up => {
                    overlay.picker.previous();
                    AppState::SelectingBranch(overlay)
                }
                KeyCode::Down => {
                    overlay.picker.next();
                    AppState::SelectingBranch(overlay)
                }
                KeyCode::Enter => {
                    if overlay.loading || overlay.picker.is_empty() {
                        AppState::SelectingBranch(overlay)
                    } else if let Some(branch) = overlay.picker.selected_item() {
                        self.schedule_adopt_branch(branch.to_string());
                        AppState::Default
                    } else {
                        AppState::SelectingBranch(overlay)
                    }
                }
                _ => AppState::SelectingBranch(overlay),
            },

            AppState::ErrorLog { scroll } => match code {
                KeyCode::Esc => AppState::Default,
                KeyCode::Up => AppState::ErrorLog {
                    scroll: scroll.saturating_sub(1),
                },
                KeyCode::Down => AppState::ErrorLog {
                    scroll: scroll.saturating_add(1),
                },
                _ => AppState::ErrorLog { scroll },
            },

            AppState::ReviewingPr(mut overlay) => match code {
                KeyCode::Esc => AppState::Default,
                KeyCode::Up => {
                    overlay.picker.previous();
                    AppState::ReviewingPr(overlay)
                }
                KeyCode::Down => {
                    overlay.picker.next();
                    AppState::ReviewingPr(overlay)
                }
                KeyCode::Enter => {
                    if overlay.pr.comments.is_empty() {
                        AppState::ReviewingPr(overlay)
                    } else {
                        AppState::CommentDetail(CommentOverlay {
                            index: overlay.picker.selected_index(),
                            scroll: 0,
                            parent: overlay,
                        })
                    }
                }
                KeyCode::Tab => {
                    // Jump to the diff tab for a comment that names a file.
                    let located = overlay
                        .pr
                        .comment(overlay.picker.selected_index())
                        .is_some_and(|c| c.path.is_some());
                    if located {
                        self.active_tab = Tab::Diff;
                        if self.navigator.is_empty() {
                            self.schedule_navigation_rebuild();
                        } else if self.navigator.rendered().is_none() {
                            self.schedule_diff_load();
                        }
                        AppState::Default
                    } else {
                        AppState::ReviewingPr(overlay)
                    }
                }
                _ => AppState::ReviewingPr(overlay),
            },

            AppState::CommentDetail(mut overlay) => match code {
                KeyCode::Esc => AppState::ReviewingPr(overlay.parent),
                KeyCode::Up => {
                    overlay.scroll = overlay.scroll.saturating_sub(1);
                    AppState::CommentDetail(overlay)
                }
                KeyCode::Down => {
                    overlay.scroll = overlay.scroll.saturating_add(1);
                    AppState::CommentDetail(overlay)
                }
                _ => AppState::CommentDetail(overlay),
            },

            AppState::Bookmarking { mut input } => match code {
                KeyCode::Esc => AppState::Default,
                KeyCode::Enter => {
                    if input.is_empty() {
                        AppState::Bookmarking { input }
                    } else {
                        self.schedule_bookmark(input.content());
                        AppState::Default
                    }
                }
                code => {
                    edit_input(&mut input, code);
                    AppState::Bookmarking { input }
                }
            },

            AppState::History { lines, scroll } => match code {
                KeyCode::Esc => AppState::Default,
                KeyCode::Up => AppState::History {
                    lines,
                    scroll: scroll.saturating_sub(1),
                },
                KeyCode::Down => AppState::History {
                    lines,
                    scroll: scroll.saturating_add(1),
                },
                _ => AppState::History { lines, scroll },
            },

            AppState::GitStatus { text, scroll } => match code {
                KeyCode::Esc => AppState::Default,
                KeyCode::Up => AppState::GitStatus {
                    text,
                    scroll: scroll.saturating_sub(1),
                },
                KeyCode::Down => AppState::GitStatus {
                    text,
                    scroll: scroll.saturating_add(1),
                },
                _ => AppState::GitStatus { text, scroll },
            },

            AppState::EditingKeybindings(mut overlay) => {
                if let Some(action) = overlay.awaiting {
                    match code {
                        KeyCode::Esc => overlay.awaiting = None,
                        code if keymap::is_bindable(code) => {
                            self.keymap.rebind(action, code);
                            self.config.keybindings = self.keymap.config_entries();
                            self.schedule_config_save();
                            overlay.awaiting = None;
                            let selected = overlay.picker.selected_index();
                            overlay.picker.set_items(self.keybinding_rows());
                            for _ in 0..selected {
                                overlay.picker.next();
                            }
                        }
                        _ => {}
                    }
                    AppState::EditingKeybindings(overlay)
                } else {
                    match code {
                        KeyCode::Esc => AppState::Default,
                        KeyCode::Up => {
                            overlay.picker.previous();
                            AppState::EditingKeybindings(overlay)
                        }
                        KeyCode::Down => {
                            overlay.picker.next();
                            AppState::EditingKeybindings(overlay)
                        }
                        KeyCode::Enter => {
                            overlay.awaiting =
                                Some(KeyAction::ALL[overlay.picker.selected_index()]);
                            AppState::EditingKeybindings(overlay)
                        }
                        _ => AppState::EditingKeybindings(overlay),
                    }
                }
            }
        }
    }

    fn default_key(&mut self, code: KeyCode) -> AppState {
        let Some(action) = self.keymap.action_for(code) else {
            return AppState::Default;
        };
        self.run_action(action)
    }

    fn run_action(&mut self, action: KeyAction) -> AppState {
        match action {
            KeyAction::Quit => {
                self.should_quit = true;
                AppState::Default
            }

            KeyAction::NewInstance => self.open_naming(false),
            KeyAction::NewWithPrompt => self.open_naming(true),

            KeyAction::Help => AppState::Help(HelpOverlay {
                kind: HelpKind::Keys,
                then: None,
            }),

            KeyAction::Attach => {
                if let Some(instance) = self.selected_instance().cloned() {
                    if instance.is_running() {
                        self.begin_attach(&instance);
                    } else {
                        self.reject_input("Instance is paused; resume it first".to_string());
                    }
                }
                AppState::Default
            }

            KeyAction::Kill => {
                if let Some(instance) = self.selected_instance() {
                    let prompt = format!("Kill instance '{}'? (y/n)", instance.title);
                    let action = ConfirmAction::KillInstance { id: instance.id };
                    if self.gate.request(prompt.clone(), action) {
                        return AppState::Confirming { prompt };
                    }
                }
                AppState::Default
            }

            KeyAction::PauseResume => {
                if let Some(instance) = self.selected_instance().cloned() {
                    if instance.is_running() {
                        self.schedule_pause(&instance);
                    } else {
                        self.schedule_resume(&instance);
                    }
                }
                AppState::Default
            }

            KeyAction::Push => {
                if let Some(instance) = self.selected_instance().cloned() {
                    self.schedule_push(&instance, false);
                }
                AppState::Default
            }

            KeyAction::ForcePush => {
                if let Some(instance) = self.selected_instance() {
                    let prompt = format!("Force push '{}'? (y/n)", instance.branch);
                    let action = ConfirmAction::ForcePush {
                        id: instance.id,
                        message: format!("Sync {}", instance.branch),
                    };
                    if self.gate.request(prompt.clone(), action) {
                        return AppState::Confirming { prompt };
                    }
                }
                AppState::Default
            }

            KeyAction::Rebase => {
                if !self.rebase.is_idle() {
                    self.reject_input("A rebase is already in progress".to_string());
                    return AppState::Default;
                }
                if let Some(instance) = self.selected_instance() {
                    let prompt = format!("Rebase '{}' onto trunk? (y/n)", instance.branch);
                    let action = ConfirmAction::Rebase { id: instance.id };
                    if self.gate.request(prompt.clone(), action) {
                        return AppState::Confirming { prompt };
                    }
                }
                AppState::Default
            }

            KeyAction::ResetRemote => {
                if let Some(instance) = self.selected_instance() {
                    let prompt = format!(
                        "Discard local work and reset '{}' to origin? (y/n)",
                        instance.branch
                    );
                    let action = ConfirmAction::ResetToRemote {
                        id: instance.id,
                        remote: "origin".to_string(),
                        branch: instance.branch.clone(),
                    };
                    if self.gate.request(prompt.clone(), action) {
                        return AppState::Confirming { prompt };
                    }
                }
                AppState::Default
            }

            KeyAction::Bookmark => {
                if self.selected_instance().is_some() {
                    AppState::Bookmarking {
                        input: TextInput::new(),
                    }
                } else {
                    AppState::Default
                }
            }

            KeyAction::SelectBranch => {
                self.branch_fetch_seq += 1;
                let seq = self.branch_fetch_seq;
                self.schedule_branch_list(seq);
                AppState::SelectingBranch(BranchPickerOverlay {
                    picker: ListPicker::new(Vec::new()),
                    seq,
                    loading: true,
                })
            }

            KeyAction::ReviewPr => {
                if let Some(instance) = self.selected_instance().cloned() {
                    self.pr_fetch_seq += 1;
                    self.schedule_pr_fetch(&instance, self.pr_fetch_seq);
                    self.show_message(format!("Fetching pull request for '{}'...", instance.branch));
                }
                AppState::Default
            }

            KeyAction::History => {
                if let Some(instance) = self.selected_instance().cloned() {
                    self.schedule_history(&instance);
                }
                AppState::Default
            }

            KeyAction::GitStatus => {
                if let Some(instance) = self.selected_instance().cloned() {
                    self.schedule_git_status(&instance);
                }
                AppState::Default
            }

            KeyAction::ErrorLog => AppState::ErrorLog { scroll: 0 },

            KeyAction::EditKeybindings => AppState::EditingKeybindings(KeybindingsOverlay {
                picker: ListPicker::new(self.keybinding_rows()),
                awaiting: None,
            }),

            KeyAction::ToggleTab => {
                self.active_tab = match self.active_tab {
                    Tab::Preview => Tab::Diff,
                    Tab::Diff => Tab::Preview,
                };
                if self.active_tab == Tab::Diff {
                    if self.navigator.is_empty() {
                        self.schedule_navigation_rebuild();
                    } else if self.navigator.rendered().is_none() {
                        self.schedule_diff_load();
                    }
                }
                AppState::Default
            }

            KeyAction::DiffOlder => {
                if self.active_tab == Tab::Diff && self.navigator.older() {
                    self.schedule_diff_load();
                }
                AppState::Default
            }

            KeyAction::DiffNewer => {
                if self.active_tab == Tab::Diff && self.navigator.newer() {
                    self.schedule_diff_load();
                }
                AppState::Default
            }

            KeyAction::Up => {
                if self.selected > 0 {
                    self.selected -= 1;
                    self.on_selection_changed();
                }
                AppState::Default
            }

            KeyAction::Down => {
                if self.selected + 1 < self.instances.len() {
                    self.selected += 1;
                    self.on_selection_changed();
                }
                AppState::Default
            }
        }
    }

    fn open_naming(&mut self, with_prompt: bool) -> AppState {
        if self.instances.len() >= self.config.max_instances {
            self.reject_input(format!(
                "Instance limit reached ({})",
                self.config.max_instances
            ));
            return AppState::Default;
        }
        let kind = if with_prompt {
            HelpKind::FirstPrompt
        } else {
            HelpKind::FirstInstance
        };
        if !self.help_seen.contains(kind.storage_key()) {
            return AppState::Help(HelpOverlay {
                kind,
                then: Some(DeferredAction::OpenNaming { with_prompt }),
            });
        }
        AppState::NamingInstance(NameOverlay {
            input: TextInput::new(),
            with_prompt,
        })
    }

    fn execute_confirmed(&mut self, action: ConfirmAction) {
        match action {
            ConfirmAction::KillInstance { id } => self.schedule_kill(id),
            ConfirmAction::Rebase { id } => {
                if !self.rebase.confirm(id) {
                    self.errors.push("Rebase requested while another is tracked".to_string());
                    return;
                }
                self.schedule_rebase_start(id);
            }
            ConfirmAction::ResetToRemote { id, remote, branch } => {
                self.schedule_reset_to_remote(id, remote, branch);
            }
            ConfirmAction::ForcePush { id, message } => {
                if let Some(instance) = self.instances.iter().find(|i| i.id == id).cloned() {
                    self.schedule_push_with_message(&instance, message, true);
                }
            }
        }
    }

    fn handle_tick(&mut self, timer: TimerId) {
        match timer {
            TimerId::MessageExpiry { seq } => {
                if seq == self.message_seq {
                    self.message = None;
                }
            }
            TimerId::PreviewRefresh => {
                if !self.suspended {
                    self.schedule_preview_capture();
                }
                self.schedule_preview_tick();
            }
            TimerId::FlashExpiry { seq } => {
                if seq == self.flash_seq {
                    self.flash = None;
                }
            }
            // Already served its purpose by arriving: the verdict
            // short-circuit consumed it.
            TimerId::VerdictSweep => {}
        }
    }

    fn handle_result(&mut self, result: AsyncResult) {
        match result {
            AsyncResult::Error(message) => {
                if self.suspended {
                    self.resume_terminal();
                }
                // The failure may belong to the tracked rebase; clearing is
                // the safe reading either way.
                if !self.rebase.is_idle() {
                    self.rebase.fail();
                }
                self.errors.push(message.clone());
                self.show_message(format!(
                    "Error: {} (press e for log)",
                    truncate_str(&message, 60)
                ));
            }

            AsyncResult::InstanceCreated(instance) => {
                let title = instance.title.clone();
                self.instances.push(instance);
                self.selected = self.instances.len() - 1;
                self.persist_instances();
                self.on_selection_changed();
                self.show_message(format!("Instance '{}' ready", title));
            }

            AsyncResult::InstanceKilled { id } => {
                self.instances.retain(|i| i.id != id);
                if self.selected >= self.instances.len() {
                    self.selected = self.instances.len().saturating_sub(1);
                }
                self.schedule_delete_instance(id);
                self.on_selection_changed();
                self.show_message("Instance killed".to_string());
            }

            AsyncResult::InstancePaused { id } => {
                self.set_status(id, InstanceStatus::Paused);
                self.persist_instances();
                self.show_message("Instance paused".to_string());
            }

            AsyncResult::InstanceResumed { id } => {
                self.set_status(id, InstanceStatus::Running);
                self.persist_instances();
                self.show_message("Instance resumed".to_string());
            }

            AsyncResult::BranchesLoaded { seq, branches } => {
                if let AppState::SelectingBranch(overlay) = &mut self.state {
                    if overlay.seq == seq {
                        overlay.picker.set_items(branches);
                        overlay.loading = false;
                        return;
                    }
                }
                tracing::debug!(seq, "discarding stale branch list");
            }

            AsyncResult::PrLoaded { seq, pr } => {
                if seq != self.pr_fetch_seq || !self.state.is_default() {
                    tracing::debug!(seq, "discarding stale pull request");
                    return;
                }
                let items: Vec<String> = if pr.comments.is_empty() {
                    vec!["(no comments)".to_string()]
                } else {
                    pr.comments
                        .iter()
                        .map(|c| {
                            let first_line = c.body.lines().next().unwrap_or("");
                            format!("{}: {}", c.author, truncate_str(first_line, 60))
                        })
                        .collect()
                };
                self.state = AppState::ReviewingPr(PrOverlay {
                    pr,
                    picker: ListPicker::new(items),
                });
            }

            AsyncResult::RebaseStarted {
                id,
                branch,
                original_sha,
                main_branch,
            } => {
                let session = RebaseSession {
                    instance_id: id,
                    branch,
                    original_sha,
                };
                if !self.rebase.begin(session) {
                    self.errors
                        .push("Rebase bookkeeping out of step; aborted".to_string());
                    return;
                }
                self.show_message(format!("Rebasing onto {}...", main_branch));
                self.schedule_rebase_run(id, main_branch);
            }

            AsyncResult::RebaseCompleted { id: _ } => {
                if let Some(session) = self.rebase.complete() {
                    self.show_message(format!("Rebased '{}' onto trunk", session.branch));
                    self.schedule_navigation_rebuild();
                }
            }

            AsyncResult::AttachFinished { id: _, reload } => {
                self.resume_terminal();
                self.schedule_preview_capture();
                if reload {
                    self.show_message("Detached".to_string());
                } else {
                    self.show_message("tmux client exited abnormally".to_string());
                }
            }

            AsyncResult::BookmarkCreated { id: _ } => {
                self.show_message("Bookmark created".to_string());
                self.schedule_navigation_rebuild();
            }

            AsyncResult::Pushed { id } => {
                let branch = self
                    .instances
                    .iter()
                    .find(|i| i.id == id)
                    .map(|i| i.branch.clone())
                    .unwrap_or_default();
                self.show_message(format!("Pushed '{}'", branch));
            }

            AsyncResult::NavigationBuilt { id, views } => {
                if self.selected_instance().map(|i| i.id) == Some(id) {
                    self.navigator.set_views(views);
                    if self.active_tab == Tab::Diff {
                        self.schedule_diff_load();
                    }
                }
            }

            AsyncResult::DiffLoaded {
                id,
                view_index,
                text,
            } => {
                if self.selected_instance().map(|i| i.id) == Some(id) {
                    self.navigator.set_rendered(view_index, text);
                }
            }

            AsyncResult::GitStatusLoaded { id, text } => {
                if self.state.is_default() && self.selected_instance().map(|i| i.id) == Some(id) {
                    self.state = AppState::GitStatus { text, scroll: 0 };
                }
            }

            AsyncResult::HistoryLoaded { id, commits } => {
                if self.state.is_default() && self.selected_instance().map(|i| i.id) == Some(id) {
                    self.state = AppState::History {
                        lines: commits,
                        scroll: 0,
                    };
                }
            }

            AsyncResult::PreviewCaptured { id, text } => {
                if self.selected_instance().map(|i| i.id) == Some(id) {
                    self.preview_text = text;
                }
            }

            AsyncResult::Persisted => {}
        }
    }

    // ---- state helpers -----------------------------------------------

    fn selected_instance(&self) -> Option<&Instance> {
        self.instances.get(self.selected)
    }

    fn set_status(&mut self, id: InstanceId, status: InstanceStatus) {
        if let Some(instance) = self.instances.iter_mut().find(|i| i.id == id) {
            instance.status = status;
        }
    }

    fn on_selection_changed(&mut self) {
        self.preview_text.clear();
        self.navigator.set_views(Vec::new());
        self.schedule_navigation_rebuild();
        self.schedule_preview_capture();
    }

    fn keybinding_rows(&self) -> Vec<String> {
        self.keymap
            .rows()
            .into_iter()
            .map(|(action, key)| format!("{:<26} {}", action.label(), key))
            .collect()
    }

    /// A refused user action: flashed like any message, and kept in the
    /// error log so it can be reviewed afterwards.
    fn reject_input(&mut self, message: String) {
        tracing::warn!("{message}");
        self.errors.push(message.clone());
        self.show_message(message);
    }

    fn show_message(&mut self, message: String) {
        self.message = Some(message);
        self.message_seq += 1;
        let seq = self.message_seq;
        self.executor.schedule(AsyncCommand::new(async move {
            tokio::time::sleep(MESSAGE_TTL).await;
            Event::Tick(TimerId::MessageExpiry { seq })
        }));
    }

    fn begin_attach(&mut self, instance: &Instance) {
        if let Err(e) = suspend_terminal() {
            self.errors.push(format!("Failed to release terminal: {e:#}"));
            return;
        }
        self.suspended = true;
        let id = instance.id;
        let session = TmuxSession::new(instance.session_name());
        self.executor.schedule(AsyncCommand::new(async move {
            match session.attach().await {
                Ok(reload) => Event::Result(AsyncResult::AttachFinished { id, reload }),
                Err(e) => Event::Result(AsyncResult::Error(format!("Attach failed: {e:#}"))),
            }
        }));
    }

    fn resume_terminal(&mut self) {
        if !self.suspended {
            return;
        }
        if let Err(e) = restore_terminal() {
            self.errors.push(format!("Failed to restore terminal: {e:#}"));
        }
        self.suspended = false;
        self.needs_clear = true;
    }

    // ---- command builders --------------------------------------------

    fn schedule_create_instance(&mut self, title: String, prompt: Option<String>) {
        // Timestamped so repeated titles get distinct branches.
        let branch = format!(
            "{}-{}",
            sanitize_branch_name(&title),
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        );
        self.schedule_launch(title, branch, prompt);
    }

    fn schedule_launch(&mut self, title: String, branch: String, prompt: Option<String>) {
        let id = self.next_id;
        self.next_id += 1;
        let program = self.config.program.clone();
        let worktrees = self.worktrees.clone();
        self.show_message(format!("Creating '{}'...", title));

        self.executor.schedule(AsyncCommand::new(async move {
            let result = async {
                let path = worktrees.create_worktree(&branch, None).await?;
                let instance = Instance::new(id, title, branch, path, program);
                let session = TmuxSession::new(instance.session_name());
                session.start(&instance.program, &instance.worktree_path).await?;
                if let Some(prompt) = prompt {
                    tokio::time::sleep(PROMPT_STARTUP_DELAY).await;
                    session.send_text(&prompt).await?;
                }
                Ok::<_, anyhow::Error>(instance)
            }
            .await;
            match result {
                Ok(instance) => Event::Result(AsyncResult::InstanceCreated(instance)),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to create instance: {e:#}"
                ))),
            }
        }));
    }

    /// Check out an existing local branch as a new instance.
    fn schedule_adopt_branch(&mut self, branch: String) {
        if self.instances.iter().any(|i| i.branch == branch) {
            self.reject_input(format!("'{}' already has an instance", branch));
            return;
        }
        self.schedule_launch(branch.clone(), branch, None);
    }

    fn schedule_kill(&mut self, id: InstanceId) {
        let Some(instance) = self.instances.iter().find(|i| i.id == id).cloned() else {
            return;
        };
        let worktrees = self.worktrees.clone();
        self.executor.schedule(AsyncCommand::new(async move {
            let session = TmuxSession::new(instance.session_name());
            // The session may already be gone; the worktree is what matters.
            session.kill().await.ok();
            match worktrees.remove_worktree(&instance.branch).await {
                Ok(()) => Event::Result(AsyncResult::InstanceKilled { id }),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to remove worktree for '{}': {e:#}",
                    instance.branch
                ))),
            }
        }));
    }

    fn schedule_pause(&mut self, instance: &Instance) {
        let id = instance.id;
        let session = TmuxSession::new(instance.session_name());
        self.executor.schedule(AsyncCommand::new(async move {
            match session.kill().await {
                Ok(()) => Event::Result(AsyncResult::InstancePaused { id }),
                Err(e) => Event::Result(AsyncResult::Error(format!("Failed to pause: {e:#}"))),
            }
        }));
    }

    fn schedule_resume(&mut self, instance: &Instance) {
        let id = instance.id;
        let program = instance.program.clone();
        let path = instance.worktree_path.clone();
        let session = TmuxSession::new(instance.session_name());
        self.executor.schedule(AsyncCommand::new(async move {
            // A leftover session gets its agent restarted in place.
            let result = if session.is_alive().await {
                session.reload(&program).await
            } else {
                session.start(&program, &path).await
            };
            match result {
                Ok(()) => Event::Result(AsyncResult::InstanceResumed { id }),
                Err(e) => Event::Result(AsyncResult::Error(format!("Failed to resume: {e:#}"))),
            }
        }));
    }

    fn schedule_push(&mut self, instance: &Instance, with_force: bool) {
        let message = format!("Sync {}", instance.branch);
        self.schedule_push_with_message(instance, message, with_force);
    }

    fn schedule_push_with_message(&mut self, instance: &Instance, message: String, with_force: bool) {
        let id = instance.id;
        let worktree = GitWorktree::new(instance.worktree_path.clone());
        self.show_message(format!("Pushing '{}'...", instance.branch));
        self.executor.schedule(AsyncCommand::new(async move {
            match worktree.push_changes(&message, with_force).await {
                Ok(()) => Event::Result(AsyncResult::Pushed { id }),
                Err(e) => Event::Result(AsyncResult::Error(format!("Push failed: {e:#}"))),
            }
        }));
    }

    fn schedule_bookmark(&mut self, message: String) {
        let Some(instance) = self.selected_instance().cloned() else {
            return;
        };
        let id = instance.id;
        let worktree = GitWorktree::new(instance.worktree_path);
        self.executor.schedule(AsyncCommand::new(async move {
            match worktree.create_bookmark_commit(&message).await {
                Ok(_sha) => Event::Result(AsyncResult::BookmarkCreated { id }),
                Err(e) => Event::Result(AsyncResult::Error(format!("Bookmark failed: {e:#}"))),
            }
        }));
    }

    /// Rebase step one: capture branch, pre-rebase SHA and the trunk name
    /// before anything moves.
    fn schedule_rebase_start(&mut self, id: InstanceId) {
        let Some(instance) = self.instances.iter().find(|i| i.id == id).cloned() else {
            self.rebase.fail();
            return;
        };
        let worktree = GitWorktree::new(instance.worktree_path);
        self.executor.schedule(AsyncCommand::new(async move {
            let result = async {
                let main_branch = worktree.main_branch().await?;
                let branch = worktree.current_branch().await?;
                let original_sha = worktree.head_sha().await?;
                Ok::<_, anyhow::Error>((branch, original_sha, main_branch))
            }
            .await;
            match result {
                Ok((branch, original_sha, main_branch)) => {
                    Event::Result(AsyncResult::RebaseStarted {
                        id,
                        branch,
                        original_sha,
                        main_branch,
                    })
                }
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to start rebase: {e:#}"
                ))),
            }
        }));
    }

    /// Rebase step two, chained off [`AsyncResult::RebaseStarted`].
    fn schedule_rebase_run(&mut self, id: InstanceId, main_branch: String) {
        let Some(instance) = self.instances.iter().find(|i| i.id == id).cloned() else {
            self.rebase.fail();
            return;
        };
        let worktree = GitWorktree::new(instance.worktree_path);
        self.executor.schedule(AsyncCommand::new(async move {
            match worktree.rebase_onto(&main_branch).await {
                Ok(()) => Event::Result(AsyncResult::RebaseCompleted { id }),
                Err(e) => Event::Result(AsyncResult::Error(format!("Rebase failed: {e:#}"))),
            }
        }));
    }

    fn schedule_reset_to_remote(&mut self, id: InstanceId, remote: String, branch: String) {
        let Some(instance) = self.instances.iter().find(|i| i.id == id).cloned() else {
            return;
        };
        let worktree = GitWorktree::new(instance.worktree_path);
        self.executor.schedule(AsyncCommand::new(async move {
            match worktree.reset_to_remote(&remote, &branch).await {
                Ok(()) => Event::Message(format!("Reset '{}' to {}/{}", branch, remote, branch)),
                Err(e) => Event::Result(AsyncResult::Error(format!("Reset failed: {e:#}"))),
            }
        }));
    }

    fn schedule_branch_list(&mut self, seq: u64) {
        let worktrees = self.worktrees.clone();
        self.executor.schedule(AsyncCommand::new(async move {
            match worktrees.local_branches().await {
                Ok(branches) => Event::Result(AsyncResult::BranchesLoaded { seq, branches }),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to list branches: {e:#}"
                ))),
            }
        }));
    }

    fn schedule_pr_fetch(&mut self, instance: &Instance, seq: u64) {
        let branch = instance.branch.clone();
        let path = instance.worktree_path.clone();
        self.executor.schedule(AsyncCommand::new(async move {
            match fetch_pull_request(&path, &branch).await {
                Ok(pr) => Event::Result(AsyncResult::PrLoaded { seq, pr }),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to fetch pull request: {e:#}"
                ))),
            }
        }));
    }

    fn schedule_history(&mut self, instance: &Instance) {
        let id = instance.id;
        let limit = self.config.history_limit;
        let worktree = GitWorktree::new(instance.worktree_path.clone());
        self.executor.schedule(AsyncCommand::new(async move {
            match worktree.commit_history(limit).await {
                Ok(commits) => Event::Result(AsyncResult::HistoryLoaded { id, commits }),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to load history: {e:#}"
                ))),
            }
        }));
    }

    fn schedule_git_status(&mut self, instance: &Instance) {
        let id = instance.id;
        let worktree = GitWorktree::new(instance.worktree_path.clone());
        self.executor.schedule(AsyncCommand::new(async move {
            match worktree.status_short().await {
                Ok(text) => Event::Result(AsyncResult::GitStatusLoaded { id, text }),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to load status: {e:#}"
                ))),
            }
        }));
    }

    fn schedule_navigation_rebuild(&mut self) {
        let Some(instance) = self.selected_instance().cloned() else {
            self.navigator.set_views(Vec::new());
            return;
        };
        let id = instance.id;
        let worktree = GitWorktree::new(instance.worktree_path);
        self.executor.schedule(AsyncCommand::new(async move {
            match build_views(&worktree).await {
                Ok(views) => Event::Result(AsyncResult::NavigationBuilt { id, views }),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to build diff views: {e:#}"
                ))),
            }
        }));
    }

    fn schedule_diff_load(&mut self) {
        let Some(instance) = self.selected_instance().cloned() else {
            return;
        };
        let Some(view) = self.navigator.current().cloned() else {
            return;
        };
        let id = instance.id;
        let view_index = self.navigator.cursor();
        let worktree = GitWorktree::new(instance.worktree_path);
        self.executor.schedule(AsyncCommand::new(async move {
            let result = match (view.from_commit.as_deref(), view.to_commit.as_str()) {
                (None, to) => worktree.diff_up_to(to).await,
                (Some(from), "HEAD") => worktree.diff(from, None).await,
                (Some(from), to) => worktree.diff(from, Some(to)).await,
            };
            match result {
                Ok(text) => Event::Result(AsyncResult::DiffLoaded {
                    id,
                    view_index,
                    text,
                }),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to load diff: {e:#}"
                ))),
            }
        }));
    }

    fn schedule_preview_tick(&mut self) {
        let interval = Duration::from_millis(self.config.preview_refresh_ms);
        self.executor.schedule(AsyncCommand::new(async move {
            tokio::time::sleep(interval).await;
            Event::Tick(TimerId::PreviewRefresh)
        }));
    }

    fn schedule_preview_capture(&mut self) {
        let Some(instance) = self.selected_instance().cloned() else {
            return;
        };
        if !instance.is_running() {
            return;
        }
        let id = instance.id;
        let session = TmuxSession::new(instance.session_name());
        self.executor.schedule(AsyncCommand::new(async move {
            match session.capture_pane().await {
                Ok(text) => Event::Result(AsyncResult::PreviewCaptured { id, text }),
                Err(e) => {
                    // Transient; the next tick retries.
                    tracing::debug!("pane capture failed: {e:#}");
                    Event::Result(AsyncResult::Persisted)
                }
            }
        }));
    }

    fn schedule_config_save(&mut self) {
        let path = self.config_path.clone();
        let config = self.config.clone();
        self.executor.schedule(AsyncCommand::new(async move {
            match config.save_to(&path).await {
                Ok(()) => Event::Result(AsyncResult::Persisted),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to save config: {e:#}"
                ))),
            }
        }));
    }

    fn schedule_mark_help_seen(&mut self, kind: String) {
        let storage = self.storage.clone();
        self.executor.schedule(AsyncCommand::new(async move {
            match storage.mark_help_seen(&kind).await {
                Ok(()) => Event::Result(AsyncResult::Persisted),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to save help flag: {e:#}"
                ))),
            }
        }));
    }

    fn schedule_delete_instance(&mut self, id: InstanceId) {
        let storage = self.storage.clone();
        self.executor.schedule(AsyncCommand::new(async move {
            match storage.delete_instance(id).await {
                Ok(()) => Event::Result(AsyncResult::Persisted),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to delete instance record: {e:#}"
                ))),
            }
        }));
    }

    fn persist_instances(&mut self) {
        let storage = self.storage.clone();
        let instances = self.instances.clone();
        self.executor.schedule(AsyncCommand::new(async move {
            match storage.save_instances(&instances).await {
                Ok(()) => Event::Result(AsyncResult::Persisted),
                Err(e) => Event::Result(AsyncResult::Error(format!(
                    "Failed to save instances: {e:#}"
                ))),
            }
        }));
    }
}

fn edit_input(input: &mut TextInput, code: KeyCode) {
    match code {
        KeyCode::Char(c) => input.insert_char(c),
        KeyCode::Backspace => input.delete_back(),
        KeyCode::Delete => input.delete_forward(),
        KeyCode::Left => input.move_left(),
        KeyCode::Right => input.move_right(),
        KeyCode::Home => input.move_start(),
        KeyCode::End => input.move_end(),
        _ => {}
    }
}

fn suspend_terminal() -> Result<()> {
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

fn restore_terminal() -> Result<()> {
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    Ok(())
}

/// Gather bookmarks, the dirty flag and per-range file counts, then build
/// the view list. Counting happens here so the builder itself stays pure.
async fn build_views(worktree: &GitWorktree) -> Result<Vec<NavigationView>> {
    let bookmarks = worktree.bookmark_commits().await?;
    if bookmarks.is_empty() {
        return Ok(Vec::new());
    }

    let newest_sha = bookmarks[bookmarks.len() - 1].sha.clone();
    let dirty = worktree.has_changes_since(&newest_sha).await?;

    let mut counts = PrecomputedCounts::default();
    if dirty {
        let n = worktree.changed_files_since(&newest_sha).await?.len();
        counts.since.insert(newest_sha, n);
    }
    for pair in bookmarks.windows(2) {
        let n = worktree
            .changed_files_between(&pair[0].sha, &pair[1].sha)
            .await?
            .len();
        counts
            .between
            .insert((pair[0].sha.clone(), pair[1].sha.clone()), n);
    }

    Ok(build_navigation_views(&bookmarks, dirty, &counts))
}

#[derive(Default)]
struct PrecomputedCounts {
    since: HashMap<String, usize>,
    between: HashMap<(String, String), usize>,
}

impl ChangeCounter for PrecomputedCounts {
    fn files_changed_since(&self, sha: &str) -> usize {
        self.since.get(sha).copied().unwrap_or(0)
    }

    fn files_changed_between(&self, from: &str, to: &str) -> usize {
        self.between
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PrComment, PullRequest};
    use crossterm::event::KeyModifiers;
    use std::path::Path;

    fn test_app(tmp: &Path) -> App {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut help_seen = HashSet::new();
        help_seen.insert(HelpKind::FirstInstance.storage_key().to_string());
        help_seen.insert(HelpKind::FirstPrompt.storage_key().to_string());
        App {
            config: Config::default(),
            keymap: Keymap::default(),
            worktrees: WorktreeService::new(tmp.to_path_buf()),
            storage: InstanceStorage::new(tmp.to_path_buf()),
            executor: CommandExecutor::new(events_tx.clone()),
            events_tx,
            events_rx,
            update: UpdateChecker::new(),
            update_status: UpdateStatus::default(),
            instances: Vec::new(),
            selected: 0,
            next_id: 1,
            state: AppState::Default,
            gate: ConfirmationGate::new(),
            rebase: RebaseTracker::new(),
            errors: ErrorLog::new(),
            navigator: DiffNavigator::new(),
            active_tab: Tab::Preview,
            preview_text: String::new(),
            message: None,
            message_seq: 0,
            flash: None,
            flash_seq: 0,
            branch_fetch_seq: 0,
            pr_fetch_seq: 0,
            help_seen,
            suspended: false,
            needs_clear: false,
            should_quit: false,
            config_path: tmp.join("config.yaml"),
        }
    }

    fn instance(id: InstanceId, title: &str) -> Instance {
        Instance::new(
            id,
            title.to_string(),
            sanitize_branch_name(title),
            PathBuf::from(format!("/tmp/corral-test/{}", id)),
            "claude".to_string(),
        )
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_event(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)));
    }

    #[tokio::test]
    async fn quit_key_sets_the_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn every_overlay_state_returns_to_default_on_esc() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        for open in [
            KeyCode::Char('n'),
            KeyCode::Char('b'),
            KeyCode::Char('e'),
            KeyCode::Char('k'),
            KeyCode::Char('c'),
        ] {
            press(&mut app, open);
            assert!(
                !app.state.is_default(),
                "key {:?} should open an overlay state",
                open
            );
            press(&mut app, KeyCode::Esc);
            assert!(app.state.is_default(), "Esc should close {:?}", open);
        }
    }

    #[tokio::test]
    async fn empty_instance_name_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());

        press(&mut app, KeyCode::Char('n'));
        assert!(matches!(app.state, AppState::NamingInstance(_)));

        press(&mut app, KeyCode::Enter);
        assert!(
            matches!(app.state, AppState::NamingInstance(_)),
            "Enter on an empty name must keep the overlay up"
        );

        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Enter);
        assert!(
            matches!(app.state, AppState::NamingInstance(_)),
            "whitespace-only names count as empty"
        );
    }

    #[tokio::test]
    async fn first_use_shows_help_before_naming() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.help_seen.clear();

        press(&mut app, KeyCode::Char('n'));
        assert!(matches!(app.state, AppState::Help(_)));

        // Dismissing the help screen opens the naming overlay directly.
        press(&mut app, KeyCode::Char(' '));
        assert!(matches!(app.state, AppState::NamingInstance(_)));

        // Second time around the help screen is skipped.
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('n'));
        assert!(matches!(app.state, AppState::NamingInstance(_)));
    }

    #[tokio::test]
    async fn instance_limit_blocks_naming() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.config.max_instances = 1;
        app.instances.push(instance(1, "auth"));

        press(&mut app, KeyCode::Char('n'));
        assert!(app.state.is_default());
        assert!(app.message.as_deref().unwrap_or("").contains("limit"));
    }

    #[tokio::test]
    async fn kill_without_instance_does_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        press(&mut app, KeyCode::Char('d'));
        assert!(app.state.is_default());
        assert!(!app.gate.is_pending());
    }

    #[tokio::test]
    async fn rejected_confirmation_changes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        press(&mut app, KeyCode::Char('d'));
        assert!(matches!(app.state, AppState::Confirming { .. }));

        press(&mut app, KeyCode::Char('n'));
        assert!(app.state.is_default(), "deciding key tears the overlay down");

        // The verdict runs on the next tick; the displaced event is requeued.
        app.handle_event(Event::Message("later".to_string()));
        assert_eq!(app.instances.len(), 1, "reject must not schedule the kill");
        // The decision wake-up may land first; the displaced message must
        // still be in the queue behind it.
        loop {
            match app.events_rx.recv().await {
                Some(Event::Message(msg)) => {
                    assert_eq!(msg, "later");
                    break;
                }
                Some(Event::Tick(_)) => continue,
                other => panic!("displaced event should be requeued, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn unrelated_keys_do_not_decide_a_confirmation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Up);
        assert!(
            matches!(app.state, AppState::Confirming { .. }),
            "unrelated keys are swallowed while the gate is up"
        );
        assert!(app.gate.is_pending());
    }

    #[tokio::test]
    async fn accepted_kill_takes_effect_on_the_result_event() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('y'));
        // Instance list is untouched until the async command reports back.
        app.handle_event(Event::Tick(TimerId::MessageExpiry { seq: 999 }));
        assert_eq!(app.instances.len(), 1);

        app.handle_event(Event::Result(AsyncResult::InstanceKilled { id: 1 }));
        assert!(app.instances.is_empty());
    }

    #[tokio::test]
    async fn stale_branch_list_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());

        press(&mut app, KeyCode::Char('c'));
        let seq = app.branch_fetch_seq;
        press(&mut app, KeyCode::Esc);
        assert!(app.state.is_default());

        app.handle_event(Event::Result(AsyncResult::BranchesLoaded {
            seq,
            branches: vec!["main".to_string()],
        }));
        assert!(
            app.state.is_default(),
            "a branch list for a cancelled picker must not reopen it"
        );
    }

    #[tokio::test]
    async fn current_branch_list_populates_the_picker() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());

        press(&mut app, KeyCode::Char('c'));
        let seq = app.branch_fetch_seq;
        app.handle_event(Event::Result(AsyncResult::BranchesLoaded {
            seq,
            branches: vec!["main".to_string(), "add-auth".to_string()],
        }));

        match &app.state {
            AppState::SelectingBranch(overlay) => {
                assert!(!overlay.loading);
                assert_eq!(overlay.picker.len(), 2);
            }
            other => panic!("expected branch picker, got {:?}", other.mode_label()),
        }
    }

    #[tokio::test]
    async fn stale_pr_result_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.pr_fetch_seq = 5;

        let pr = PullRequest {
            number: 1,
            title: "old".to_string(),
            url: String::new(),
            body: String::new(),
            comments: vec![],
        };
        app.handle_event(Event::Result(AsyncResult::PrLoaded { seq: 4, pr }));
        assert!(app.state.is_default(), "stale PR fetch must not open review");
    }

    #[tokio::test]
    async fn pr_result_opens_review_with_comment_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.pr_fetch_seq = 1;

        let pr = PullRequest {
            number: 7,
            title: "Add auth".to_string(),
            url: String::new(),
            body: String::new(),
            comments: vec![PrComment {
                author: "reviewer".to_string(),
                body: "first line\nsecond line".to_string(),
                path: None,
            }],
        };
        app.handle_event(Event::Result(AsyncResult::PrLoaded { seq: 1, pr }));

        match &app.state {
            AppState::ReviewingPr(overlay) => {
                assert_eq!(overlay.picker.len(), 1);
                assert!(overlay.picker.selected_item().unwrap().starts_with("reviewer:"));
            }
            other => panic!("expected review overlay, got {:?}", other.mode_label()),
        }
    }

    #[tokio::test]
    async fn comment_detail_returns_to_review() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.pr_fetch_seq = 1;
        let pr = PullRequest {
            number: 7,
            title: "Add auth".to_string(),
            url: String::new(),
            body: String::new(),
            comments: vec![PrComment {
                author: "reviewer".to_string(),
                body: "nit".to_string(),
                path: None,
            }],
        };
        app.handle_event(Event::Result(AsyncResult::PrLoaded { seq: 1, pr }));

        press(&mut app, KeyCode::Enter);
        assert!(matches!(app.state, AppState::CommentDetail(_)));
        press(&mut app, KeyCode::Esc);
        assert!(
            matches!(app.state, AppState::ReviewingPr(_)),
            "Esc from a comment returns to the review overlay, not Default"
        );
    }

    #[tokio::test]
    async fn message_expiry_ignores_stale_timers() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());

        app.handle_event(Event::Message("first".to_string()));
        app.handle_event(Event::Message("second".to_string()));
        let stale_seq = app.message_seq - 1;

        app.handle_event(Event::Tick(TimerId::MessageExpiry { seq: stale_seq }));
        assert_eq!(
            app.message.as_deref(),
            Some("second"),
            "an older message's expiry must not clear a newer message"
        );

        let live_seq = app.message_seq;
        app.handle_event(Event::Tick(TimerId::MessageExpiry { seq: live_seq }));
        assert!(app.message.is_none());
    }

    #[tokio::test]
    async fn rebase_flow_tracks_and_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        press(&mut app, KeyCode::Char('r'));
        assert!(matches!(app.state, AppState::Confirming { .. }));
        press(&mut app, KeyCode::Char('y'));
        app.handle_event(Event::Tick(TimerId::MessageExpiry { seq: 999 }));
        assert!(!app.rebase.is_idle(), "accepted rebase must be tracked");

        app.handle_event(Event::Result(AsyncResult::RebaseStarted {
            id: 1,
            branch: "auth".to_string(),
            original_sha: "abc".to_string(),
            main_branch: "main".to_string(),
        }));
        assert!(app.rebase.is_in_progress());
        assert_eq!(app.rebase.session().unwrap().original_sha, "abc");

        app.handle_event(Event::Result(AsyncResult::RebaseCompleted { id: 1 }));
        assert!(app.rebase.is_idle());
        assert!(app.message.as_deref().unwrap_or("").contains("auth"));
    }

    #[tokio::test]
    async fn second_rebase_is_refused_while_one_is_tracked() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));
        app.instances.push(instance(2, "ci"));

        press(&mut app, KeyCode::Char('r'));
        press(&mut app, KeyCode::Char('y'));
        app.handle_event(Event::Tick(TimerId::MessageExpiry { seq: 999 }));
        assert!(!app.rebase.is_idle());

        press(&mut app, KeyCode::Char('r'));
        assert!(
            app.state.is_default(),
            "rebase key with one tracked must not open a confirmation"
        );
        assert!(!app.gate.is_pending());
    }

    #[tokio::test]
    async fn error_result_resets_the_rebase_tracker() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));
        app.rebase.confirm(1);
        app.rebase.begin(RebaseSession {
            instance_id: 1,
            branch: "auth".to_string(),
            original_sha: "abc".to_string(),
        });

        app.handle_event(Event::Result(AsyncResult::Error("rebase blew up".to_string())));
        assert!(app.rebase.is_idle(), "failure must clear the tracker");
        assert_eq!(app.errors.len(), 1);
        assert!(app.message.as_deref().unwrap_or("").starts_with("Error:"));
    }

    #[tokio::test]
    async fn selection_moves_are_clamped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));
        app.instances.push(instance(2, "ci"));

        press(&mut app, KeyCode::Up);
        assert_eq!(app.selected, 0);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected, 1);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected, 1);
    }

    #[tokio::test]
    async fn navigation_result_for_other_instance_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        app.handle_event(Event::Result(AsyncResult::NavigationBuilt {
            id: 99,
            views: vec![NavigationView {
                kind: navigation::ViewKind::Initial,
                title: "Initial changes".to_string(),
                description: String::new(),
                from_commit: None,
                to_commit: "sha".to_string(),
            }],
        }));
        assert!(
            app.navigator.is_empty(),
            "views for a non-selected instance must be discarded"
        );
    }

    #[tokio::test]
    async fn preview_capture_for_other_instance_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        app.handle_event(Event::Result(AsyncResult::PreviewCaptured {
            id: 2,
            text: "other pane".to_string(),
        }));
        assert!(app.preview_text.is_empty());

        app.handle_event(Event::Result(AsyncResult::PreviewCaptured {
            id: 1,
            text: "pane".to_string(),
        }));
        assert_eq!(app.preview_text, "pane");
    }

    #[tokio::test]
    async fn killed_instance_clamps_selection_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));
        app.instances.push(instance(2, "ci"));
        app.selected = 1;

        app.handle_event(Event::Result(AsyncResult::InstanceKilled { id: 2 }));
        assert_eq!(app.instances.len(), 1);
        assert_eq!(app.selected, 0, "selection must be clamped after a kill");
    }

    #[tokio::test]
    async fn adopting_a_branch_with_an_instance_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));
        let next = app.next_id;

        app.schedule_adopt_branch("auth".to_string());
        assert_eq!(app.next_id, next, "no instance id may be consumed");
        assert!(app.message.as_deref().unwrap_or("").contains("already"));
    }

    #[tokio::test]
    async fn keybinding_editor_rebinds_on_next_key() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());

        press(&mut app, KeyCode::Char('k'));
        assert!(matches!(app.state, AppState::EditingKeybindings(_)));

        // Row 0 is Quit; rebind it to 'x'.
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('x'));
        assert_eq!(
            app.keymap.action_for(KeyCode::Char('x')),
            Some(KeyAction::Quit)
        );

        press(&mut app, KeyCode::Esc);
        assert!(app.state.is_default());
        press(&mut app, KeyCode::Char('x'));
        assert!(app.should_quit, "the new binding must be live immediately");
    }

    #[tokio::test]
    async fn rebinding_records_the_config_override() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());

        press(&mut app, KeyCode::Char('k'));
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('x'));

        assert_eq!(
            app.config.keybindings.get("quit").map(String::as_str),
            Some("x"),
            "a rebind must be reflected in the saved config overrides"
        );
    }

    #[tokio::test]
    async fn recognized_key_flashes_its_hint() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        press(&mut app, KeyCode::Char('b'));
        assert_eq!(app.flash, Some(KeyAction::Bookmark));

        // A stale expiry leaves a newer flash alone.
        let stale = app.flash_seq;
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('h'));
        app.handle_event(Event::Tick(TimerId::FlashExpiry { seq: stale }));
        assert_eq!(app.flash, Some(KeyAction::History));

        app.handle_event(Event::Tick(TimerId::FlashExpiry { seq: app.flash_seq }));
        assert_eq!(app.flash, None);
    }

    #[tokio::test]
    async fn no_hint_flash_while_confirming() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        press(&mut app, KeyCode::Char('d'));
        assert!(matches!(app.state, AppState::Confirming { .. }));
        assert_eq!(app.flash, Some(KeyAction::Kill));

        press(&mut app, KeyCode::Char('n'));
        assert_eq!(
            app.flash,
            Some(KeyAction::Kill),
            "the gate owns input; no hint may flash for its keys"
        );
    }

    #[tokio::test]
    async fn prompt_cancel_still_creates_the_instance() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());

        press(&mut app, KeyCode::Char('N'));
        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Enter);
        assert!(matches!(app.state, AppState::Prompting(_)));

        let next = app.next_id;
        press(&mut app, KeyCode::Esc);
        assert!(
            app.state.is_default(),
            "cancelling the prompt must land in default"
        );
        assert_eq!(
            app.next_id,
            next + 1,
            "cancelling the prompt must still create the instance"
        );
        assert!(app.message.as_deref().unwrap_or("").contains("Creating"));
    }

    #[tokio::test]
    async fn located_comment_jumps_to_the_diff_tab() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));
        app.pr_fetch_seq = 1;

        let pr = PullRequest {
            number: 7,
            title: "Add auth".to_string(),
            url: String::new(),
            body: String::new(),
            comments: vec![PrComment {
                author: "reviewer".to_string(),
                body: "nit".to_string(),
                path: Some("src/lib.rs".to_string()),
            }],
        };
        app.handle_event(Event::Result(AsyncResult::PrLoaded { seq: 1, pr }));
        assert!(matches!(app.state, AppState::ReviewingPr(_)));

        press(&mut app, KeyCode::Tab);
        assert!(app.state.is_default(), "a located comment must close review");
        assert_eq!(app.active_tab, Tab::Diff);
    }

    #[tokio::test]
    async fn comment_without_a_path_stays_in_review() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.pr_fetch_seq = 1;

        let pr = PullRequest {
            number: 7,
            title: "Add auth".to_string(),
            url: String::new(),
            body: String::new(),
            comments: vec![PrComment {
                author: "reviewer".to_string(),
                body: "general remark".to_string(),
                path: None,
            }],
        };
        app.handle_event(Event::Result(AsyncResult::PrLoaded { seq: 1, pr }));

        press(&mut app, KeyCode::Tab);
        assert!(
            matches!(app.state, AppState::ReviewingPr(_)),
            "no file to jump to; the overlay must stay up"
        );
        assert_eq!(app.active_tab, Tab::Preview);
    }

    #[tokio::test]
    async fn decided_confirmation_runs_on_the_queued_wakeup() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));

        press(&mut app, KeyCode::Char('r'));
        press(&mut app, KeyCode::Char('y'));
        assert!(app.state.is_default());
        assert!(app.rebase.is_idle(), "nothing runs until the next event");

        let event = app
            .events_rx
            .recv()
            .await
            .expect("deciding must queue a wake-up event");
        app.handle_event(event);
        assert!(
            !app.rebase.is_idle(),
            "the confirmed rebase must start without further input"
        );
    }

    #[tokio::test]
    async fn refused_actions_reach_the_error_log() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = test_app(tmp.path());
        app.config.max_instances = 0;
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.errors.len(), 1, "a refused action must be logged");
        assert!(app.message.as_deref().unwrap_or("").contains("limit"));

        let mut app = test_app(tmp.path());
        app.instances.push(instance(1, "auth"));
        app.instances[0].status = InstanceStatus::Paused;
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.errors.len(), 1);
        assert!(app.message.as_deref().unwrap_or("").contains("paused"));
    }
}
