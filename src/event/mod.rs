//! Contains the events and functionality for monitoring the commands the pipeline sends.

pub mod command;
