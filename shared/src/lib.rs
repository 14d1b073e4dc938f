pub mod ipc;

pub use ipc::{
    socket_path, Event, EventKind, EventSource, IpcError, OutputMode, OutputStatus, PreviewImage,
    Request, Response, RunnerStatus, ToggleStatus, UnknownOutputMode,
};
