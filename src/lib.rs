pub mod attack;
pub mod conditioner;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod dsp;
pub mod frame_logger;
pub mod hold;
pub mod note;
pub mod pitch_tracker;
pub mod sampler;
pub mod simulator;
pub mod trace_reader;
pub mod types;
pub mod wav_player;
