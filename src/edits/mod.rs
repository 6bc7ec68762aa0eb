// In-browser edit operations: rotate, greyscale, histogram equalization,
// delete and save, dispatched from the fullscreen viewer.
mod error;
mod handlers;
mod ops;

pub use error::EditError;
pub use handlers::{
    image_operation_handler, move_to_deleted_handler, pending_edit_handler, save_image_handler,
};
pub use ops::EditOperation;
