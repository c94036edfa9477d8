pub mod nv40;
