use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced at the crate boundary.
///
/// Only the transport-frame decode can fail: a structurally broken frame is
/// a producer bug worth reporting. Inside the assembly path, failure is
/// always "drop this one unit" or "fall back to the safest renderable
/// shape" — nothing here ever propagates into rendering.
#[derive(Error, Diagnostic, Debug)]
pub enum AssemblyError {
    #[error("Block event frame is not valid JSON")]
    #[diagnostic(
        code(masoret::frame_parse),
        help("The transport handed over a frame that does not parse as JSON at all")
    )]
    FrameParse {
        #[source]
        cause: serde_json::Error,
    },

    #[error("Block event frame has an invalid shape")]
    #[diagnostic(
        code(masoret::frame_decode),
        help(
            "Frames must carry a `kind` of start/delta/end and a non-negative integer `position`"
        )
    )]
    FrameDecode {
        #[source]
        cause: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
