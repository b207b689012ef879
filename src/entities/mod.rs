pub mod graph_movie;
pub mod graph_tv;
pub mod movie;
pub mod movie_credit;
pub mod person;
pub mod tv_credit;
pub mod tv_series;
