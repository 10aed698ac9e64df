pub mod workers_scale;
