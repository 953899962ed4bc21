// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Small functions for testing purposes.
