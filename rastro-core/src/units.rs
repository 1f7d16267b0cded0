//! Speed unit conversions. Positions carry speed in knots.

const KNOTS_PER_KPH: f64 = 0.539_957;
const KNOTS_PER_MPS: f64 = 1.943_844;

pub fn knots_from_kph(value: f64) -> f64 {
    value * KNOTS_PER_KPH
}

pub fn knots_from_mps(value: f64) -> f64 {
    value * KNOTS_PER_MPS
}

pub fn kph_from_knots(value: f64) -> f64 {
    value / KNOTS_PER_KPH
}
