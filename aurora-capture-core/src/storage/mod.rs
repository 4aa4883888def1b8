pub mod checksum;
pub mod metadata;
pub mod sample_writer;
pub mod temp_files;
