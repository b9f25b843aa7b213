use crate::font::FontQuery;
use crate::types::{Color, Px, Rect};

/// Draw commands recorded by the render pass and executed by the
/// rasterizer. Coordinates are image-space: origin top-left, y growing
/// downward, text positioned by its baseline.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    // Fill alpha multiplier. Values outside 0..1 are clamped.
    SetOpacity { fill: f32 },
    SetFont { query: FontQuery, size: Px },
    ClipRoundedRect { rect: Rect, radius: Px },
    FillRect { rect: Rect },
    FillLinearGradient {
        rect: Rect,
        from: (Px, Px),
        to: (Px, Px),
        start: Color,
        end: Color,
    },
    StrokeLine {
        from: (Px, Px),
        to: (Px, Px),
        width: Px,
    },
    DrawString { x: Px, y: Px, text: String },
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    fill_opacity: f32,
    font: Option<(FontQuery, Px)>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            fill_opacity: 1.0,
            font: None,
        }
    }
}

/// Records draw commands for one card. State setters deduplicate against
/// the current graphics state so the command list stays small.
pub(crate) struct Canvas {
    commands: Vec<Command>,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub(crate) fn new() -> Self {
        Self {
            commands: Vec::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
        }
    }

    pub(crate) fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.commands.push(Command::SaveState);
    }

    pub(crate) fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.commands.push(Command::RestoreState);
        }
    }

    pub(crate) fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.commands.push(Command::SetFillColor(color));
    }

    pub(crate) fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub(crate) fn set_opacity(&mut self, fill: f32) {
        let fill = fill.clamp(0.0, 1.0);
        if self.current_state.fill_opacity == fill {
            return;
        }
        self.current_state.fill_opacity = fill;
        self.commands.push(Command::SetOpacity { fill });
    }

    pub(crate) fn set_font(&mut self, query: &FontQuery, size: Px) {
        if self
            .current_state
            .font
            .as_ref()
            .is_some_and(|(q, s)| q == query && *s == size)
        {
            return;
        }
        self.current_state.font = Some((query.clone(), size));
        self.commands.push(Command::SetFont {
            query: query.clone(),
            size,
        });
    }

    pub(crate) fn clip_rounded_rect(&mut self, rect: Rect, radius: Px) {
        self.commands.push(Command::ClipRoundedRect { rect, radius });
    }

    pub(crate) fn fill_rect(&mut self, rect: Rect) {
        self.commands.push(Command::FillRect { rect });
    }

    pub(crate) fn fill_linear_gradient(
        &mut self,
        rect: Rect,
        from: (Px, Px),
        to: (Px, Px),
        start: Color,
        end: Color,
    ) {
        self.commands.push(Command::FillLinearGradient {
            rect,
            from,
            to,
            start,
            end,
        });
    }

    pub(crate) fn stroke_line(&mut self, from: (Px, Px), to: (Px, Px), width: Px) {
        self.commands.push(Command::StrokeLine { from, to, width });
    }

    pub(crate) fn draw_string(&mut self, x: Px, y: Px, text: impl Into<String>) {
        self.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub(crate) fn finish(self) -> Vec<Command> {
        self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_setters_deduplicate() {
        let mut canvas = Canvas::new();
        let red = Color::rgb(1.0, 0.0, 0.0);
        canvas.set_fill_color(red);
        canvas.set_fill_color(red);
        canvas.set_opacity(0.5);
        canvas.set_opacity(0.5);
        let commands = canvas.finish();
        assert_eq!(
            commands,
            vec![
                Command::SetFillColor(red),
                Command::SetOpacity { fill: 0.5 },
            ]
        );
    }

    #[test]
    fn restore_reverts_dedup_state() {
        let mut canvas = Canvas::new();
        let red = Color::rgb(1.0, 0.0, 0.0);
        canvas.set_fill_color(red);
        canvas.save_state();
        canvas.set_fill_color(Color::BLACK);
        canvas.restore_state();
        // After restore the recorded state is red again, so setting red
        // emits nothing new.
        canvas.set_fill_color(red);
        let commands = canvas.finish();
        assert_eq!(
            commands,
            vec![
                Command::SetFillColor(red),
                Command::SaveState,
                Command::SetFillColor(Color::BLACK),
                Command::RestoreState,
            ]
        );
    }

    #[test]
    fn opacity_is_clamped() {
        let mut canvas = Canvas::new();
        canvas.set_opacity(7.0);
        assert_eq!(canvas.finish(), vec![Command::SetOpacity { fill: 1.0 }]);
    }
}
