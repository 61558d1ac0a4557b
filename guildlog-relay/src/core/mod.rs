/*!
Core modules of the event relay
*/

pub mod commands;
pub mod config;
pub mod detection_engine;
pub mod event_system;
pub mod invites;
pub mod output_plugins;
pub mod records;
pub mod settings;
pub mod state_manager;
pub mod tracker;
