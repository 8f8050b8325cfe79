use crate::app_state::State;
use crate::field::params::Palette;

/// Which renderer instance a window belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    /// Full-page background field, pointer-coupled.
    Backdrop,
    /// Inset field behind the portrait image, sized from its parent box.
    Portrait,
}

/// Events injected into the winit loop from outside a window's own event
/// stream: async init completion, the portrait container observer, and the
/// host page's JSON API.
#[derive(Debug)]
pub enum UserCommand {
    /// Notifies App that an instance's async State setup has settled.
    StateInitialized(FieldRole),
    /// The portrait canvas's parent element changed size (layout shift,
    /// font load, responsive reflow); box in logical px.
    ParentBoxResized { width: f32, height: f32 },
    /// Re-theme every running instance.
    SetPalette(Palette),
}

impl State {
    pub fn process_command(&mut self, command: &UserCommand) {
        match command {
            UserCommand::SetPalette(palette) => {
                log::info!("Applying palette: {:?}", palette);
                self.field.set_palette(*palette);
            }
            // Routed at the App level: these need window handles.
            UserCommand::StateInitialized(_) | UserCommand::ParentBoxResized { .. } => {}
        }
    }
}
