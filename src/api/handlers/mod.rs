mod callbacks;
mod files;
mod health;

pub use callbacks::{accept_processing, finalize_link_count, record_links};
pub use files::{
    delete_file, get_dispatch, get_file, get_file_links, list_files, redispatch, upload_file,
};
pub use health::health;
