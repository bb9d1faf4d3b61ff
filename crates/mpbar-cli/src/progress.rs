use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use mpbar_config::DisplayConfig;
use mpbar_core::{Postfix, RenderError, Renderer};

use crate::CliError;

/// Hands out `indicatif` bars that share one terminal region, so nested
/// sessions stack instead of overwriting each other.
pub struct BarFactory {
    multi: MultiProgress,
    style: ProgressStyle,
}

impl BarFactory {
    pub fn new(display: &DisplayConfig) -> Result<Self, CliError> {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(
            display.refresh_hz,
        ));
        Self::with_multi(multi, display)
    }

    /// Bars that never draw anything.
    pub fn hidden(display: &DisplayConfig) -> Result<Self, CliError> {
        Self::with_multi(
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            display,
        )
    }

    fn with_multi(multi: MultiProgress, display: &DisplayConfig) -> Result<Self, CliError> {
        let style = ProgressStyle::with_template(&display.template)
            .map_err(|e| CliError::Template(e.to_string()))?
            .progress_chars(&display.progress_chars);
        Ok(Self { multi, style })
    }

    pub fn bar(&self) -> Box<dyn Renderer> {
        let pb = self.multi.add(ProgressBar::no_length());
        pb.set_style(self.style.clone());
        Box::new(IndicatifRenderer { pb })
    }
}

struct IndicatifRenderer {
    pb: ProgressBar,
}

impl Renderer for IndicatifRenderer {
    fn set_total(&mut self, total: Option<u64>) -> Result<(), RenderError> {
        match total {
            Some(len) => self.pb.set_length(len),
            None => self.pb.unset_length(),
        }
        Ok(())
    }

    fn set_description(&mut self, description: &str) -> Result<(), RenderError> {
        self.pb.set_prefix(description.to_string());
        Ok(())
    }

    fn set_postfix(&mut self, postfix: &Postfix) -> Result<(), RenderError> {
        self.pb.set_message(postfix.to_string());
        Ok(())
    }

    fn advance(&mut self, n: u64) -> Result<(), RenderError> {
        self.pb.inc(n);
        Ok(())
    }

    fn close(&mut self, leave: bool) -> Result<(), RenderError> {
        if leave {
            self.pb.finish();
        } else {
            self.pb.finish_and_clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_tracks_position_and_length() {
        let factory = BarFactory::hidden(&DisplayConfig::default()).unwrap();
        let mut bar = factory.bar();
        bar.set_description("items").unwrap();
        bar.set_total(Some(4)).unwrap();
        bar.advance(3).unwrap();
        bar.set_postfix(&Postfix::new().with("k", "v")).unwrap();
        bar.close(true).unwrap();
    }

    #[test]
    fn indicatif_renderer_applies_updates() {
        let pb = ProgressBar::hidden();
        let mut renderer = IndicatifRenderer { pb: pb.clone() };
        renderer.set_total(Some(10)).unwrap();
        renderer.advance(4).unwrap();
        renderer.set_postfix(&Postfix::new().with("file", "a")).unwrap();
        assert_eq!(pb.position(), 4);
        assert_eq!(pb.length(), Some(10));
        assert_eq!(pb.message(), "file=a");
        renderer.set_total(None).unwrap();
        assert_eq!(pb.length(), None);
        renderer.close(false).unwrap();
        assert!(pb.is_finished());
    }
}
