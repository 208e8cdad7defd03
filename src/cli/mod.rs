//! CLI commands for s3transport
//!
//! # Usage
//!
//! ```bash
//! # Upload a 1 MiB random payload
//! s3transport put obj-1 --size 1M --progress
//!
//! # Upload a file as part 2 of a multipart upload
//! s3transport put big.bin --file ./part2 --part-number 2 --upload-id <id>
//!
//! # Download a range to a file
//! s3transport get obj-1 --output ./obj-1 --range 0-1023
//!
//! # Warm the DNS cache for 16 concurrent transfers
//! s3transport warm 16
//!
//! # Show the bucket endpoint
//! s3transport endpoint --json
//! ```

pub mod commands;
