use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::detection::domain::face::Face;
use crate::overlay::renderer;
use crate::overlay::surface::Surface;

/// Commands accepted by the in-page overlay (the messaging surface exposed
/// to the host page).
#[derive(Debug, Clone)]
pub enum OverlayCommand {
    /// Create the full-viewport overlay surface, replacing any existing one.
    Inject { width: u32, height: u32 },
    /// Remove the overlay and forget any stored faces.
    Clear,
    /// Replace the displayed faces and redraw them at raw coordinates.
    UpdateFaces(Vec<Face>),
}

/// Receipt sent back for every command, including no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// A full-viewport annotation layer driven by [`OverlayCommand`]s.
///
/// Unlike the per-slot surfaces, faces here are drawn 1:1 at their source
/// coordinates and are retained so a viewport resize can redraw them.
#[derive(Default)]
pub struct PageOverlay {
    surface: Option<Surface>,
    faces: Vec<Face>,
}

impl PageOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one command. Every command is acknowledged synchronously;
    /// commands against a non-injected overlay are safe no-ops.
    pub fn handle(&mut self, command: OverlayCommand) -> Ack {
        match command {
            OverlayCommand::Inject { width, height } => {
                self.surface = Some(Surface::new(width, height));
                self.faces.clear();
            }
            OverlayCommand::Clear => {
                self.surface = None;
                self.faces.clear();
            }
            OverlayCommand::UpdateFaces(faces) => {
                self.faces = faces;
                self.redraw();
            }
        }
        Ack
    }

    /// Resizes the viewport surface and redraws the stored faces at the new
    /// size. No-op while not injected.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.surface.is_none() {
            return;
        }
        if let Some(surface) = self.surface.as_mut() {
            surface.resize(width, height);
        }
        self.redraw();
    }

    fn redraw(&mut self) {
        let faces = std::mem::take(&mut self.faces);
        if let Some(surface) = self.surface.as_mut() {
            // 1:1 with the page: source size equals surface size.
            let (width, height) = (surface.width(), surface.height());
            renderer::render(surface, &faces, width, height);
        }
        self.faces = faces;
    }

    pub fn is_injected(&self) -> bool {
        self.surface.is_some()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }
}

/// A command paired with the channel its ack goes back on.
pub type CommandEnvelope = (OverlayCommand, Sender<Ack>);

/// Runs a page overlay on its own thread, answering each command with an
/// ack. Dropping the returned sender shuts the overlay down; joining the
/// handle yields its final state.
pub fn serve() -> (Sender<CommandEnvelope>, JoinHandle<PageOverlay>) {
    let (tx, rx): (Sender<CommandEnvelope>, Receiver<CommandEnvelope>) =
        crossbeam_channel::unbounded();
    let handle = thread::spawn(move || {
        let mut overlay = PageOverlay::new();
        for (command, ack_tx) in rx {
            let ack = overlay.handle(command);
            if ack_tx.send(ack).is_err() {
                log::debug!("overlay command sender went away before ack");
            }
        }
        overlay
    });
    (tx, handle)
}
