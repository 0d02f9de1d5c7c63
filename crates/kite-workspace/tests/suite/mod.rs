mod archives;
mod classpath;
mod documents;
mod initialize;
mod lifecycle;
mod requests;
mod support;
