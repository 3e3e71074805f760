use crate::shared::constants::TRIM_STEP;
use crate::shared::framing_config::FramingConfig;

/// Keyboard commands understood while framing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCommand {
    Quit,
    ZoomIn,
    ZoomOut,
    FrameUp,
    FrameDown,
    FrameLeft,
    FrameRight,
}

/// What the caller should do after a command was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandEffect {
    Continue,
    Shutdown,
}

impl KeyCommand {
    /// Maps a typed character; anything else, shifted letters included, maps
    /// to `None`.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'q' => Some(KeyCommand::Quit),
            'z' => Some(KeyCommand::ZoomIn),
            'x' => Some(KeyCommand::ZoomOut),
            'w' => Some(KeyCommand::FrameUp),
            's' => Some(KeyCommand::FrameDown),
            'a' => Some(KeyCommand::FrameLeft),
            'd' => Some(KeyCommand::FrameRight),
            _ => None,
        }
    }

    /// Applies the command to the shared framing parameters. Trims saturate
    /// at `[0, 1]`.
    pub fn apply(self, config: &FramingConfig) -> CommandEffect {
        match self {
            KeyCommand::Quit => return CommandEffect::Shutdown,
            KeyCommand::ZoomIn => {
                config.adjust_trim_zoom(TRIM_STEP);
            }
            KeyCommand::ZoomOut => {
                config.adjust_trim_zoom(-TRIM_STEP);
            }
            // w moves the framing point up within the face box.
            KeyCommand::FrameUp => {
                config.adjust_trim_vertical(-TRIM_STEP);
            }
            KeyCommand::FrameDown => {
                config.adjust_trim_vertical(TRIM_STEP);
            }
            KeyCommand::FrameLeft => {
                config.adjust_trim_horizontal(-TRIM_STEP);
            }
            KeyCommand::FrameRight => {
                config.adjust_trim_horizontal(TRIM_STEP);
            }
        }
        log::debug!(
            "{self:?}: trims v={:.2} h={:.2} zoom={:.2}",
            config.trim_vertical(),
            config.trim_horizontal(),
            config.trim_zoom()
        );
        CommandEffect::Continue
    }
}
