pub mod boundary_distance;
pub mod fusion;
pub mod guided_filter;
pub mod initial_estimate;
pub mod local_linear;
pub mod refine;
pub mod state;
pub mod summed_area_table;
pub mod trimap;
pub mod windowed_statistics;
