use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use iced::widget::{column, container, image, text};
use iced::{event, keyboard, window, ContentFit, Element, Event, Length, Subscription, Task, Theme};

use autoframe_core::control::key_command::{CommandEffect, KeyCommand};
use autoframe_core::pipeline::pipeline_executor::{PipelineEvent, StopReason};
use autoframe_core::shared::frame_slot::LatestFrameSlot;
use autoframe_core::shared::framing_config::{FramingConfig, FramingParams};

pub const STATUS_BAR_HEIGHT: f32 = 32.0;

/// ~60 Hz frame polling.
const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Handles shared with the framing pipeline.
#[derive(Clone)]
pub struct Session {
    pub frames: Arc<LatestFrameSlot>,
    pub config: Arc<FramingConfig>,
    pub running: Arc<AtomicBool>,
    pub events: crossbeam_channel::Receiver<PipelineEvent>,
}

// ---------------------------------------------------------------------------
// Face status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FaceStatus {
    Starting,
    Searching,
    Tracking,
    Stopped(StopReason),
}

impl FaceStatus {
    pub fn after(self, event: PipelineEvent) -> Self {
        match (self, event) {
            (stopped @ FaceStatus::Stopped(_), _) => stopped,
            (_, PipelineEvent::Started) | (_, PipelineEvent::FaceLost) => FaceStatus::Searching,
            (_, PipelineEvent::FaceAcquired) => FaceStatus::Tracking,
            (_, PipelineEvent::Stopped(reason)) => FaceStatus::Stopped(reason),
        }
    }

    fn label(&self) -> String {
        match self {
            FaceStatus::Starting => "Starting camera".to_string(),
            FaceStatus::Searching => "Looking for a face".to_string(),
            FaceStatus::Tracking => "Tracking face".to_string(),
            FaceStatus::Stopped(reason) => format!("Stopped: {reason}"),
        }
    }
}

pub fn status_line(status: &FaceStatus, params: &FramingParams) -> String {
    format!(
        "{}  |  trim v {:.2}  h {:.2}  zoom {:.2}  |  q quit, z/x zoom, w/a/s/d move",
        status.label(),
        params.trim_vertical,
        params.trim_horizontal,
        params.trim_zoom
    )
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Message {
    Tick,
    KeyPressed(char),
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    session: Session,
    frame: Option<image::Handle>,
    seen_generation: u64,
    status: FaceStatus,
}

impl App {
    pub fn new(session: Session) -> (Self, Task<Message>) {
        (
            Self {
                session,
                frame: None,
                seen_generation: 0,
                status: FaceStatus::Starting,
            },
            Task::none(),
        )
    }

    pub fn title(&self) -> String {
        "AutoFrame".to_string()
    }

    pub fn theme(&self) -> Theme {
        Theme::Dark
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => {
                self.drain_events();
                if let Some((generation, frame)) =
                    self.session.frames.latest_since(self.seen_generation)
                {
                    self.seen_generation = generation;
                    self.frame = Some(image::Handle::from_rgba(
                        frame.width(),
                        frame.height(),
                        frame.to_rgba(),
                    ));
                }
                if self.should_exit() {
                    return iced::exit();
                }
            }
            Message::KeyPressed(c) => {
                if let Some(command) = KeyCommand::from_char(c) {
                    if command.apply(&self.session.config) == CommandEffect::Shutdown {
                        log::info!("Quit requested");
                        self.session.running.store(false, Ordering::SeqCst);
                        return iced::exit();
                    }
                }
            }
        }
        Task::none()
    }

    fn drain_events(&mut self) {
        for event in self.session.events.try_iter() {
            if let PipelineEvent::Stopped(reason) = &event {
                if *reason != StopReason::QuitRequested {
                    log::warn!("Framing stopped: {reason}");
                }
            }
            self.status = std::mem::replace(&mut self.status, FaceStatus::Starting).after(event);
        }
    }

    fn should_exit(&self) -> bool {
        matches!(self.status, FaceStatus::Stopped(_))
            || !self.session.running.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> Element<'_, Message> {
        let preview: Element<'_, Message> = match &self.frame {
            Some(handle) => image(handle.clone())
                .content_fit(ContentFit::Contain)
                .width(Length::Fill)
                .height(Length::Fill)
                .into(),
            None => container(text("Waiting for camera..."))
                .center(Length::Fill)
                .into(),
        };

        let line = status_line(&self.status, &self.session.config.snapshot());
        let status = container(text(line).size(14))
            .padding([6, 12])
            .height(Length::Fixed(STATUS_BAR_HEIGHT));

        column![preview, status].into()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            iced::time::every(FRAME_POLL_INTERVAL).map(|_| Message::Tick),
            event::listen_with(key_press),
        ])
    }
}

fn key_press(event: Event, _status: event::Status, _window: window::Id) -> Option<Message> {
    match event {
        Event::Keyboard(keyboard::Event::KeyPressed {
            key: keyboard::Key::Character(c),
            ..
        }) => c.chars().next().map(Message::KeyPressed),
        _ => None,
    }
}
