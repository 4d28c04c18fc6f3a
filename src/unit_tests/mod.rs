mod bench;

#[cfg(test)]
mod blocking;
#[cfg(test)]
mod flow_control;
#[cfg(test)]
mod non_blocking;
#[cfg(test)]
mod system;
