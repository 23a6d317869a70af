//! Engine-level error type aggregating the subsystem errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cadenza_core::Error),

    #[error(transparent)]
    Graph(#[from] cadenza_graph::Error),

    #[error(transparent)]
    Stream(#[from] cadenza_stream::Error),

    #[error("the render half of this engine has already been taken")]
    RendererTaken,
}

pub type Result<T> = std::result::Result<T, Error>;
