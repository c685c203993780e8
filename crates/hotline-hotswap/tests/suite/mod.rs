mod fake;
mod session;
mod upload;
