// Test modules for CombDB

#[cfg(test)]
pub mod header_tests;


#[cfg(test)]
pub mod pool_tests;

#[cfg(test)]
pub mod crypto_tests;

#[cfg(test)]
pub mod codec_tests;



#[cfg(test)]
pub mod pipeline_tests;
